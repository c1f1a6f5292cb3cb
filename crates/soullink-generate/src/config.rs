use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder key shipped in sample configuration files.
pub const PLACEHOLDER_API_KEY: &str = "your-api-key-here";

fn default_provider() -> String {
    "openai".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

/// Which expression strategy the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    /// Remote OpenAI-compatible service.
    #[default]
    #[serde(alias = "api")]
    Remote,
    /// Locally hosted model, falling back to remote when unavailable.
    Local,
}

impl std::str::FromStr for StrategyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "api" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown strategy mode: {}", other)),
        }
    }
}

/// Connection settings for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on one request/response exchange.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// True when a real key is configured (not empty, not the sample placeholder).
    pub fn has_credentials(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != PLACEHOLDER_API_KEY
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `{base_url}/{path}` without doubling the separator.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Per-purpose overrides layered on top of the shared [`ApiConfig`].
///
/// Unset fields inherit from the base section, so a config file can point chat
/// and expression generation at different models while sharing one key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiOverrides {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl ApiOverrides {
    pub fn apply(&self, base: &ApiConfig) -> ApiConfig {
        ApiConfig {
            provider: self.provider.clone().unwrap_or_else(|| base.provider.clone()),
            api_key: self.api_key.clone().unwrap_or_else(|| base.api_key.clone()),
            base_url: self.base_url.clone().unwrap_or_else(|| base.base_url.clone()),
            model: self.model.clone().unwrap_or_else(|| base.model.clone()),
            temperature: self.temperature.unwrap_or(base.temperature),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
        }
    }
}

fn default_base_model_path() -> PathBuf {
    PathBuf::from("./ct2model/models/qwen2.5-1.5b-instruct")
}

fn default_lora_model_path() -> PathBuf {
    PathBuf::from("./ct2model/output/l2d-motion-lora/final")
}

fn default_binary_path() -> PathBuf {
    PathBuf::from("llama-cli")
}

fn default_device() -> String {
    "auto".to_string()
}

fn default_local_temperature() -> f32 {
    0.1
}

fn default_max_new_tokens() -> u32 {
    512
}

fn default_local_timeout_secs() -> u64 {
    120
}

/// Settings for the locally hosted expression model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    #[serde(default = "default_base_model_path")]
    pub base_model_path: PathBuf,
    #[serde(default = "default_lora_model_path")]
    pub lora_model_path: PathBuf,
    /// Inference executable (llama.cpp-compatible command line).
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,
    /// `auto`, `cpu`, or an accelerator name.
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_local_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_local_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            base_model_path: default_base_model_path(),
            lora_model_path: default_lora_model_path(),
            binary_path: default_binary_path(),
            device: default_device(),
            temperature: default_local_temperature(),
            max_new_tokens: default_max_new_tokens(),
            timeout_secs: default_local_timeout_secs(),
        }
    }
}

impl LocalModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
