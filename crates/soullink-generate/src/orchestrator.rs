//! Per-request generation orchestration.
//!
//! The orchestrator owns the selected expression strategy, the chat strategy
//! and the schema store. It bounds every backend call with a timeout, turns
//! strategy failures into per-request outcomes and validates every expression
//! against the schema as it stands when the backend returns.

use crate::error::GenerateError;
use crate::extract::ExpressionDraft;
use crate::store::SchemaStore;
use crate::strategy::{ChatStrategy, ExpressionStrategy, StrategyKind};
use soullink_types::{ChatTurn, GeneratedExpression, ParameterSchema, DEFAULT_TRANSITION_MS};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default upper bound on a single backend call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Combined result of a chat-with-expression request.
///
/// Both branches are always present; a failed branch carries its default value
/// and the failure text.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: String,
    pub reply_error: Option<String>,
    pub expression: GeneratedExpression,
    pub expression_error: Option<String>,
    pub elapsed: Duration,
}

pub struct Orchestrator {
    expression: Arc<dyn ExpressionStrategy>,
    chat: Arc<dyn ChatStrategy>,
    schema: SchemaStore,
    call_timeout: Duration,
    default_duration_ms: u64,
}

impl Orchestrator {
    pub fn new(
        expression: Arc<dyn ExpressionStrategy>,
        chat: Arc<dyn ChatStrategy>,
        schema: SchemaStore,
    ) -> Self {
        Self {
            expression,
            chat,
            schema,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            default_duration_ms: DEFAULT_TRANSITION_MS,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.expression.kind()
    }

    pub fn schema(&self) -> &SchemaStore {
        &self.schema
    }

    /// Replaces the schema and notifies the expression strategy.
    ///
    /// Returns the number of parameters in the new schema.
    pub fn update_schema(&self, schema: ParameterSchema) -> usize {
        let count = schema.len();
        self.schema.replace(schema);
        self.expression.on_schema_update(&self.schema.snapshot());
        count
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, GenerateError>
    where
        F: Future<Output = Result<T, GenerateError>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(GenerateError::Timeout(self.call_timeout)))
    }

    fn validate(&self, draft: ExpressionDraft) -> GeneratedExpression {
        GeneratedExpression {
            label: draft.label.unwrap_or_default(),
            parameters: self.schema.clamp_and_filter(&draft.parameters),
            transition_duration_ms: draft.duration_ms.unwrap_or(self.default_duration_ms),
        }
    }

    /// Runs the selected expression strategy and validates its output.
    pub async fn express(&self, text: &str, context: &str) -> Result<GeneratedExpression, GenerateError> {
        let draft = self.bounded(self.expression.generate(text, context)).await?;
        let expression = self.validate(draft);
        tracing::info!(
            strategy = %self.expression.kind(),
            label = %expression.label,
            count = expression.parameters.len(),
            "expression generated"
        );
        Ok(expression)
    }

    /// Runs chat and expression generation concurrently and waits for both.
    pub async fn chat_with_expression(
        &self,
        text: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> ChatOutcome {
        let started = Instant::now();

        let (reply, expression) = tokio::join!(
            self.bounded(self.chat.reply(text, history)),
            self.bounded(self.expression.generate(text, context)),
        );

        let (reply, reply_error) = match reply {
            Ok(reply) => (reply, None),
            Err(e) => {
                tracing::warn!("chat branch failed: {}", e);
                (format!("chat generation failed: {}", e), Some(e.to_string()))
            }
        };

        let (expression, expression_error) = match expression {
            Ok(draft) => (self.validate(draft), None),
            Err(e) => {
                tracing::warn!("expression branch failed: {}", e);
                (
                    GeneratedExpression::empty(self.default_duration_ms),
                    Some(e.to_string()),
                )
            }
        };

        let elapsed = started.elapsed();
        tracing::info!(
            elapsed_ms = elapsed.as_millis() as u64,
            reply_ok = reply_error.is_none(),
            expression_ok = expression_error.is_none(),
            label = %expression.label,
            "chat request completed"
        );

        ChatOutcome {
            reply,
            reply_error,
            expression,
            expression_error,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use soullink_types::ParameterRange;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedExpression {
        result: Result<BTreeMap<String, f64>, String>,
        delay: Duration,
        schema_updates: AtomicUsize,
    }

    impl FixedExpression {
        fn ok(params: &[(&str, f64)]) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(params.iter().map(|(k, v)| (k.to_string(), *v)).collect()),
                delay: Duration::ZERO,
                schema_updates: AtomicUsize::new(0),
            })
        }

        fn failing(msg: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Err(msg.to_string()),
                delay: Duration::ZERO,
                schema_updates: AtomicUsize::new(0),
            })
        }

        fn slow() -> Arc<Self> {
            Arc::new(Self {
                result: Ok(BTreeMap::new()),
                delay: Duration::from_secs(5),
                schema_updates: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ExpressionStrategy for FixedExpression {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Remote
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn generate(&self, _text: &str, _context: &str) -> Result<ExpressionDraft, GenerateError> {
            tokio::time::sleep(self.delay).await;
            match &self.result {
                Ok(parameters) => Ok(ExpressionDraft {
                    label: Some("happy".to_string()),
                    parameters: parameters.clone(),
                    duration_ms: None,
                }),
                Err(msg) => Err(GenerateError::Backend(msg.clone())),
            }
        }

        fn on_schema_update(&self, _schema: &ParameterSchema) {
            self.schema_updates.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FixedChat(Result<String, String>);

    #[async_trait]
    impl ChatStrategy for FixedChat {
        async fn reply(&self, _message: &str, _history: &[ChatTurn]) -> Result<String, GenerateError> {
            self.0.clone().map_err(GenerateError::Backend)
        }
    }

    fn eye_schema() -> ParameterSchema {
        let mut schema = ParameterSchema::new();
        schema.insert("ParamEyeLOpen", ParameterRange::new(0.0, 1.0, ""));
        schema
    }

    fn orchestrator(expression: Arc<FixedExpression>, chat: Result<&str, &str>) -> Orchestrator {
        let chat = FixedChat(chat.map(str::to_string).map_err(str::to_string));
        let orchestrator = Orchestrator::new(expression, Arc::new(chat), SchemaStore::new())
            .with_call_timeout(Duration::from_millis(100));
        orchestrator.update_schema(eye_schema());
        orchestrator
    }

    #[tokio::test]
    async fn express_clamps_and_filters_backend_output() {
        let orch = orchestrator(
            FixedExpression::ok(&[("ParamEyeLOpen", 1.5), ("Unknown", 0.3)]),
            Ok("hi"),
        );
        let expr = orch.express("hello", "").await.unwrap();
        assert_eq!(expr.label, "happy");
        assert_eq!(expr.parameters, BTreeMap::from([("ParamEyeLOpen".to_string(), 1.0)]));
        assert_eq!(expr.transition_duration_ms, DEFAULT_TRANSITION_MS);
    }

    #[tokio::test]
    async fn express_validates_against_schema_at_completion_time() {
        let orch = orchestrator(FixedExpression::ok(&[("ParamEyeLOpen", 0.9)]), Ok("hi"));
        let mut narrower = ParameterSchema::new();
        narrower.insert("ParamEyeLOpen", ParameterRange::new(0.0, 0.5, ""));
        orch.update_schema(narrower);

        let expr = orch.express("hello", "").await.unwrap();
        assert_eq!(expr.parameters["ParamEyeLOpen"], 0.5);
    }

    #[tokio::test]
    async fn express_surfaces_strategy_failure() {
        let orch = orchestrator(FixedExpression::failing("status 500"), Ok("hi"));
        let err = orch.express("hello", "").await.unwrap_err();
        assert!(matches!(err, GenerateError::Backend(_)));
    }

    #[tokio::test]
    async fn slow_strategy_times_out_as_ordinary_failure() {
        let orch = orchestrator(FixedExpression::slow(), Ok("hi"));
        let err = orch.express("hello", "").await.unwrap_err();
        assert!(matches!(err, GenerateError::Timeout(_)));
    }

    #[tokio::test]
    async fn chat_failure_keeps_expression_result() {
        let orch = orchestrator(FixedExpression::ok(&[("ParamEyeLOpen", 0.7)]), Err("quota exceeded"));
        let outcome = orch.chat_with_expression("hello", "", &[]).await;

        assert!(outcome.reply.contains("chat generation failed"));
        assert!(outcome.reply.contains("quota exceeded"));
        assert!(outcome.reply_error.is_some());
        assert!(outcome.expression_error.is_none());
        assert_eq!(outcome.expression.parameters["ParamEyeLOpen"], 0.7);
    }

    #[tokio::test]
    async fn expression_failure_keeps_chat_reply() {
        let orch = orchestrator(FixedExpression::failing("no JSON"), Ok("Hello there!"));
        let outcome = orch.chat_with_expression("hello", "", &[]).await;

        assert_eq!(outcome.reply, "Hello there!");
        assert!(outcome.reply_error.is_none());
        assert!(outcome.expression_error.is_some());
        assert_eq!(outcome.expression, GeneratedExpression::empty(DEFAULT_TRANSITION_MS));
    }

    #[tokio::test]
    async fn both_failures_are_reported_together() {
        let orch = orchestrator(FixedExpression::slow(), Err("down"));
        let outcome = orch.chat_with_expression("hello", "", &[]).await;

        assert!(outcome.reply_error.is_some());
        assert!(outcome.expression_error.as_deref().unwrap().contains("timed out"));
        assert!(outcome.expression.parameters.is_empty());
    }

    #[tokio::test]
    async fn update_schema_notifies_strategy_and_reports_count() {
        let strategy = FixedExpression::ok(&[]);
        let orch = Orchestrator::new(
            strategy.clone(),
            Arc::new(FixedChat(Ok(String::new()))),
            SchemaStore::new(),
        );
        let mut schema = eye_schema();
        schema.insert("ParamAngleX", ParameterRange::new(-30.0, 30.0, ""));

        assert_eq!(orch.update_schema(schema), 2);
        assert_eq!(orch.schema().len(), 2);
        assert_eq!(strategy.schema_updates.load(Ordering::SeqCst), 1);
    }
}
