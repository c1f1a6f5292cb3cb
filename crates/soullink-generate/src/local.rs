//! Expression generation with a locally hosted model.
//!
//! The model itself is an opaque capability behind [`InferenceEngine`]. The
//! strategy owns the lifecycle: the model is loaded lazily on first use,
//! exactly once, and a failed load is final for the life of the process.
//! Inference calls against the loaded model are serialized.

use crate::config::LocalModelConfig;
use crate::error::GenerateError;
use crate::extract::{parse_expression_reply, ExpressionDraft};
use crate::store::SchemaStore;
use crate::strategy::{ExpressionStrategy, StrategyKind};
use async_trait::async_trait;
use soullink_types::ParameterSchema;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::{Mutex, OnceCell};

/// Transition duration the local model's training data uses.
pub const LOCAL_DEFAULT_DURATION_MS: u64 = 600;

/// Parameters described individually in the prompt; the rest are only counted.
const PROMPT_PARAMETER_LIMIT: usize = 8;

/// Something that can load a model and run inference on it.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Whether the artifacts needed by [`load`](Self::load) exist.
    fn artifacts_present(&self) -> bool;

    /// Acquires the model. Called at most once per strategy.
    async fn load(&self) -> Result<Arc<dyn LoadedModel>, GenerateError>;
}

/// A model ready for inference.
#[async_trait]
pub trait LoadedModel: Send + Sync {
    async fn infer(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// Runs a llama.cpp-compatible executable against a base model and LoRA adapter.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    config: LocalModelConfig,
}

impl ProcessEngine {
    pub fn new(config: LocalModelConfig) -> Self {
        Self { config }
    }
}

fn resolve_artifact(path: &Path, what: &str) -> Result<PathBuf, GenerateError> {
    path.canonicalize()
        .map_err(|_| GenerateError::Config(format!("{} not found: {}", what, path.display())))
}

#[async_trait]
impl InferenceEngine for ProcessEngine {
    fn artifacts_present(&self) -> bool {
        self.config.base_model_path.exists() && self.config.lora_model_path.exists()
    }

    async fn load(&self) -> Result<Arc<dyn LoadedModel>, GenerateError> {
        let base = resolve_artifact(&self.config.base_model_path, "base model")?;
        let lora = resolve_artifact(&self.config.lora_model_path, "LoRA adapter")?;

        tracing::info!(
            base = %base.display(),
            lora = %lora.display(),
            device = %self.config.device,
            "local model artifacts resolved"
        );

        Ok(Arc::new(ProcessModel {
            binary: self.config.binary_path.clone(),
            base,
            lora,
            config: self.config.clone(),
        }))
    }
}

struct ProcessModel {
    binary: PathBuf,
    base: PathBuf,
    lora: PathBuf,
    config: LocalModelConfig,
}

#[async_trait]
impl LoadedModel for ProcessModel {
    async fn infer(&self, prompt: &str) -> Result<String, GenerateError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("-m")
            .arg(&self.base)
            .arg("--lora")
            .arg(&self.lora)
            .arg("-p")
            .arg(prompt)
            .arg("-n")
            .arg(self.config.max_new_tokens.to_string())
            .arg("--temp")
            .arg(self.config.temperature.to_string())
            .arg("--top-p")
            .arg("0.9")
            .arg("--no-display-prompt")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if self.config.device == "cpu" {
            command.arg("-ngl").arg("0");
        }

        let child = command
            .spawn()
            .map_err(|e| GenerateError::Backend(format!("failed to spawn local model: {}", e)))?;

        let output = tokio::time::timeout(self.config.timeout(), child.wait_with_output())
            .await
            .map_err(|_| GenerateError::Timeout(self.config.timeout()))?
            .map_err(|e| GenerateError::Backend(format!("failed to read local model output: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerateError::Backend(format!(
                "local model exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Keyword → (emotion, intensity). First match in table order wins.
const EMOTION_KEYWORDS: &[(&str, &str, f32)] = &[
    ("开心", "happy", 0.8),
    ("高兴", "happy", 0.7),
    ("快乐", "happy", 0.8),
    ("哈哈", "happy", 0.9),
    ("happy", "happy", 0.8),
    ("悲伤", "sad", 0.7),
    ("难过", "sad", 0.6),
    ("伤心", "sad", 0.8),
    ("哭", "sad", 0.9),
    ("sad", "sad", 0.7),
    ("生气", "angry", 0.8),
    ("愤怒", "angry", 0.9),
    ("angry", "angry", 0.8),
    ("烦", "annoyed", 0.6),
    ("惊讶", "surprised", 0.8),
    ("吃惊", "surprised", 0.7),
    ("surprise", "surprised", 0.8),
    ("害羞", "shy", 0.7),
    ("不好意思", "shy", 0.5),
    ("脸红", "shy", 0.8),
    ("shy", "shy", 0.7),
    ("思考", "thinking", 0.6),
    ("嗯", "thinking", 0.5),
    ("困", "sleepy", 0.7),
    ("累", "sleepy", 0.6),
    ("sleepy", "sleepy", 0.7),
    ("兴奋", "excited", 0.8),
    ("excited", "excited", 0.8),
    ("担心", "worried", 0.6),
    ("紧张", "worried", 0.7),
    ("worried", "worried", 0.6),
    ("困惑", "confused", 0.6),
    ("疑惑", "confused", 0.5),
    ("confused", "confused", 0.6),
];

/// Maps free text to the emotion label the local model was trained on.
pub fn detect_emotion(text: &str) -> (&'static str, f32) {
    let lowered = text.to_lowercase();
    EMOTION_KEYWORDS
        .iter()
        .find(|(keyword, _, _)| lowered.contains(keyword))
        .map(|(_, emotion, intensity)| (*emotion, *intensity))
        .unwrap_or(("neutral", 0.5))
}

/// ChatML prompt in the format the LoRA adapter was fine-tuned on.
pub fn build_prompt(schema: &ParameterSchema, emotion: &str, intensity: f32) -> String {
    let mut described: Vec<String> = schema
        .iter()
        .take(PROMPT_PARAMETER_LIMIT)
        .map(|(id, range)| {
            let (low, high) = range.bounds();
            format!("{}[{},{}]", id, low, high)
        })
        .collect();
    if schema.len() > PROMPT_PARAMETER_LIMIT {
        described.push(format!("... {} parameters in total", schema.len()));
    }

    let user_input = serde_json::json!({
        "emotion": emotion,
        "intensity": intensity,
        "params": schema.ids().collect::<Vec<_>>(),
    });

    format!(
        "<|im_start|>system\nYou map emotions to Live2D parameters. Produce parameter JSON for the given emotion.\nAvailable parameters: {}\nReturn JSON only.<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n",
        described.join(", "),
        user_input
    )
}

pub struct LocalExpression {
    engine: Arc<dyn InferenceEngine>,
    schema: SchemaStore,
    // Uninitialized until the first generate; then either Ready or permanently failed.
    model: OnceCell<Result<Arc<dyn LoadedModel>, String>>,
    inference: Mutex<()>,
}

impl LocalExpression {
    pub fn new(engine: Arc<dyn InferenceEngine>, schema: SchemaStore) -> Self {
        Self {
            engine,
            schema,
            model: OnceCell::new(),
            inference: Mutex::new(()),
        }
    }

    /// Local strategy backed by the default [`ProcessEngine`].
    pub fn from_config(config: LocalModelConfig, schema: SchemaStore) -> Self {
        Self::new(Arc::new(ProcessEngine::new(config)), schema)
    }

    /// Returns the loaded model, loading it if this is the first call.
    ///
    /// Concurrent first callers wait on the same load.
    async fn model(&self) -> Result<Arc<dyn LoadedModel>, GenerateError> {
        let outcome = self
            .model
            .get_or_init(|| async {
                tracing::info!("loading local expression model");
                let started = Instant::now();
                match self.engine.load().await {
                    Ok(model) => {
                        tracing::info!(
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "local expression model ready"
                        );
                        Ok(model)
                    }
                    Err(e) => {
                        tracing::error!("local expression model failed to load: {}", e);
                        Err(e.to_string())
                    }
                }
            })
            .await;

        match outcome {
            Ok(model) => Ok(model.clone()),
            Err(msg) => Err(GenerateError::Config(format!("local model unavailable: {}", msg))),
        }
    }
}

#[async_trait]
impl ExpressionStrategy for LocalExpression {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Local
    }

    fn is_available(&self) -> bool {
        self.engine.artifacts_present()
    }

    async fn generate(&self, text: &str, _context: &str) -> Result<ExpressionDraft, GenerateError> {
        let model = self.model().await?;

        let schema = self.schema.snapshot();
        if schema.is_empty() {
            return Err(GenerateError::EmptySchema);
        }

        let (emotion, intensity) = detect_emotion(text);
        tracing::debug!(emotion, intensity, "local model emotion detected");
        let prompt = build_prompt(&schema, emotion, intensity);

        let started = Instant::now();
        let raw = {
            let _serialized = self.inference.lock().await;
            model.infer(&prompt).await?
        };
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            emotion,
            "local inference finished"
        );

        let mut draft = match parse_expression_reply(&raw) {
            Ok(draft) => draft,
            Err(e) => {
                tracing::warn!("local model output was not usable JSON, using neutral pose: {}", e);
                ExpressionDraft::default()
            }
        };
        draft.label.get_or_insert_with(|| emotion.to_string());
        draft.duration_ms.get_or_insert(LOCAL_DEFAULT_DURATION_MS);
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soullink_types::ParameterRange;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedModel {
        reply: String,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl LoadedModel for ScriptedModel {
        async fn infer(&self, _prompt: &str) -> Result<String, GenerateError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    struct CountingEngine {
        loads: AtomicUsize,
        fail: bool,
        model: Arc<ScriptedModel>,
    }

    impl CountingEngine {
        fn new(reply: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                fail,
                model: Arc::new(ScriptedModel {
                    reply: reply.to_string(),
                    active: AtomicUsize::new(0),
                    max_active: AtomicUsize::new(0),
                }),
            })
        }
    }

    #[async_trait]
    impl InferenceEngine for CountingEngine {
        fn artifacts_present(&self) -> bool {
            !self.fail
        }

        async fn load(&self) -> Result<Arc<dyn LoadedModel>, GenerateError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                Err(GenerateError::Config("base model not found: /missing".to_string()))
            } else {
                Ok(self.model.clone())
            }
        }
    }

    fn schema_store() -> SchemaStore {
        let store = SchemaStore::new();
        let mut schema = ParameterSchema::new();
        schema.insert("ParamEyeLOpen", ParameterRange::new(0.0, 1.0, ""));
        schema.insert("ParamMouthForm", ParameterRange::new(-1.0, 1.0, ""));
        store.replace(schema);
        store
    }

    #[tokio::test]
    async fn concurrent_first_use_loads_once_and_serializes_inference() {
        let engine = CountingEngine::new(r#"{"parameters": {"ParamEyeLOpen": 0.2}}"#, false);
        let strategy = Arc::new(LocalExpression::new(engine.clone(), schema_store()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let strategy = strategy.clone();
                tokio::spawn(async move { strategy.generate("好开心", "").await })
            })
            .collect();
        for handle in handles {
            let draft = handle.await.unwrap().unwrap();
            assert_eq!(draft.label.as_deref(), Some("happy"));
            assert_eq!(draft.duration_ms, Some(LOCAL_DEFAULT_DURATION_MS));
        }

        assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
        assert_eq!(engine.model.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_is_permanent() {
        let engine = CountingEngine::new("{}", true);
        let strategy = LocalExpression::new(engine.clone(), schema_store());

        for _ in 0..3 {
            let err = strategy.generate("hello", "").await.unwrap_err();
            assert!(matches!(err, GenerateError::Config(_)));
        }
        assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_schema_is_declared_error() {
        let engine = CountingEngine::new("{}", false);
        let strategy = LocalExpression::new(engine, SchemaStore::new());
        let err = strategy.generate("hello", "").await.unwrap_err();
        assert!(matches!(err, GenerateError::EmptySchema));
    }

    #[tokio::test]
    async fn unparseable_output_falls_back_to_detected_emotion() {
        let engine = CountingEngine::new("sorry, no json today", false);
        let strategy = LocalExpression::new(engine, schema_store());
        let draft = strategy.generate("我有点难过", "").await.unwrap();
        assert_eq!(draft.label.as_deref(), Some("sad"));
        assert!(draft.parameters.is_empty());
        assert_eq!(draft.duration_ms, Some(LOCAL_DEFAULT_DURATION_MS));
    }

    #[test]
    fn emotion_detection_defaults_to_neutral() {
        assert_eq!(detect_emotion("今天天气不错"), ("neutral", 0.5));
        assert_eq!(detect_emotion("I am SO Excited"), ("excited", 0.8));
        assert_eq!(detect_emotion("哈哈哈"), ("happy", 0.9));
    }

    #[test]
    fn prompt_describes_at_most_eight_parameters() {
        let schema: ParameterSchema = (0..10)
            .map(|i| (format!("P{:02}", i), ParameterRange::new(0.0, 1.0, "")))
            .collect();
        let prompt = build_prompt(&schema, "happy", 0.8);
        assert!(prompt.contains("P07[0,1]"));
        assert!(!prompt.contains("P08[0,1]"));
        assert!(prompt.contains("10 parameters in total"));
        assert!(prompt.contains("\"P09\""));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn process_engine_reports_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = LocalModelConfig {
            base_model_path: dir.path().join("base"),
            lora_model_path: dir.path().join("lora"),
            ..LocalModelConfig::default()
        };
        let engine = ProcessEngine::new(config.clone());
        assert!(!engine.artifacts_present());

        std::fs::create_dir(&config.base_model_path).unwrap();
        std::fs::create_dir(&config.lora_model_path).unwrap();
        assert!(engine.artifacts_present());
    }

    #[tokio::test]
    async fn process_engine_load_fails_for_missing_base_model() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ProcessEngine::new(LocalModelConfig {
            base_model_path: dir.path().join("absent"),
            lora_model_path: dir.path().to_path_buf(),
            ..LocalModelConfig::default()
        });
        match engine.load().await {
            Err(GenerateError::Config(msg)) => assert!(msg.contains("base model not found")),
            Err(other) => panic!("expected config error, got {:?}", other),
            Ok(_) => panic!("expected load to fail"),
        }
    }
}
