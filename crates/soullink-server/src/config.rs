//! Server configuration loading from file and environment variables.

use serde::{Deserialize, Serialize};
use soullink_generate::{ApiConfig, ApiOverrides, LocalModelConfig, StrategyMode};
use soullink_voice::{AsrMode, VoiceConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network and filesystem settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Generation backends.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Presentation defaults handed to clients.
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub ui: UiConfig,

    /// Speech recognition and synthesis.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Catalog watcher timing.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directories scanned for model bundles. Each is also served at `/<dir-name>`.
    #[serde(default = "default_model_dirs")]
    pub model_dirs: Vec<PathBuf>,

    /// Presentation client files, served as the fallback route.
    #[serde(default = "default_frontend_dir")]
    pub frontend_dir: PathBuf,

    /// Extra asset directories served at `/<dir-name>` when present.
    #[serde(default = "default_static_dirs")]
    pub static_dirs: Vec<PathBuf>,
}

/// `[llm]` section: strategy mode plus backend settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub mode: StrategyMode,

    /// Shared remote endpoint settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Overrides for expression generation; unset fields inherit from `api`.
    #[serde(default)]
    pub expression: ApiOverrides,

    /// Overrides for chat replies; unset fields inherit from `api`.
    #[serde(default)]
    pub chat: ApiOverrides,

    #[serde(default)]
    pub local: LocalModelConfig,
}

impl LlmConfig {
    pub fn expression_api(&self) -> ApiConfig {
        self.expression.apply(&self.api)
    }

    pub fn chat_api(&self) -> ApiConfig {
        self.chat.apply(&self.api)
    }

    /// Bound applied by the orchestrator to each backend call.
    pub fn call_timeout(&self) -> Duration {
        let expression = match self.mode {
            StrategyMode::Local => self.local.timeout().max(self.expression_api().timeout()),
            StrategyMode::Remote => self.expression_api().timeout(),
        };
        expression.max(self.chat_api().timeout())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct AnimationConfig {
    #[serde(default = "default_animation_duration")]
    pub default_duration: u64,
    #[serde(default = "default_easing")]
    pub easing: String,
    #[serde(default = "default_auto_reset_delay")]
    pub auto_reset_delay: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ModelConfig {
    #[serde(default = "default_model_directory")]
    pub directory: String,
    #[serde(default = "default_scale")]
    pub default_scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct UiConfig {
    #[serde(default = "default_true")]
    pub show_control_panel: bool,
    #[serde(default)]
    pub show_physics_params: bool,
    #[serde(default)]
    pub default_background: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "soullink_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    3000
}

fn default_model_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("./l2d")]
}

fn default_frontend_dir() -> PathBuf {
    PathBuf::from("./frontend")
}

fn default_static_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("./static"), PathBuf::from("./background")]
}

fn default_animation_duration() -> u64 {
    1000
}

fn default_easing() -> String {
    "easeInOutCubic".to_string()
}

fn default_auto_reset_delay() -> u64 {
    1500
}

fn default_model_directory() -> String {
    "./l2d".to_string()
}

fn default_scale() -> f64 {
    0.8
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            model_dirs: default_model_dirs(),
            frontend_dir: default_frontend_dir(),
            static_dirs: default_static_dirs(),
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            default_duration: default_animation_duration(),
            easing: default_easing(),
            auto_reset_delay: default_auto_reset_delay(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            directory: default_model_directory(),
            default_scale: default_scale(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_control_panel: true,
            show_physics_params: false,
            default_background: 0,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl CatalogConfig {
    pub fn watch_settings(&self) -> soullink_catalog::watcher::WatchSettings {
        soullink_catalog::watcher::WatchSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }
}

/// Configuration exposed to presentation clients at `GET /api/config`.
///
/// Built from [`Config`] with every credential and endpoint URL left out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendConfig {
    pub server: FrontendServer,
    pub llm: FrontendLlm,
    pub animation: AnimationConfig,
    pub model: ModelConfig,
    pub ui: UiConfig,
    pub voice: FrontendVoice,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendServer {
    pub host: String,
    pub port: u16,
    pub model_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrontendLlm {
    pub mode: StrategyMode,
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrontendVoice {
    pub asr: FrontendAsr,
    pub tts: FrontendTts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendAsr {
    pub enabled: bool,
    pub mode: AsrMode,
    pub language: String,
    pub auto_send: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrontendTts {
    pub enabled: bool,
    pub model: String,
    pub voice: String,
    pub speed: f32,
}

impl Config {
    pub fn frontend(&self) -> FrontendConfig {
        let llm = match self.llm.mode {
            StrategyMode::Remote => {
                let api = self.llm.expression_api();
                FrontendLlm {
                    mode: StrategyMode::Remote,
                    provider: api.provider,
                    model: api.model,
                }
            }
            StrategyMode::Local => FrontendLlm {
                mode: StrategyMode::Local,
                provider: "local".to_string(),
                model: self
                    .llm
                    .local
                    .base_model_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "local".to_string()),
            },
        };

        FrontendConfig {
            server: FrontendServer {
                host: self.server.host.to_string(),
                port: self.server.port,
                model_dirs: self
                    .server
                    .model_dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect(),
            },
            llm,
            animation: self.animation.clone(),
            model: self.model.clone(),
            ui: self.ui.clone(),
            voice: FrontendVoice {
                asr: FrontendAsr {
                    enabled: self.voice.asr.enabled,
                    mode: self.voice.asr.mode,
                    language: self.voice.asr.language.clone(),
                    auto_send: self.voice.asr.auto_send,
                },
                tts: FrontendTts {
                    enabled: self.voice.tts.enabled,
                    model: self.voice.tts.model.clone(),
                    voice: self.voice.tts.voice.clone(),
                    speed: self.voice.tts.speed,
                },
            },
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Applies environment overrides through `lookup`.
///
/// - `SOULLINK_HOST` overrides `server.host`
/// - `SOULLINK_PORT` overrides `server.port`
/// - `SOULLINK_LOG_LEVEL` overrides `logging.level`
/// - `SOULLINK_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `SOULLINK_LLM_MODE` overrides `llm.mode` (`remote`, `api` or `local`)
/// - `SOULLINK_API_KEY` overrides `llm.api.api_key`
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("SOULLINK_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("SOULLINK_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = lookup("SOULLINK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("SOULLINK_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(mode) = lookup("SOULLINK_LLM_MODE") {
        match mode.parse() {
            Ok(parsed) => config.llm.mode = parsed,
            Err(e) => tracing::warn!("ignoring SOULLINK_LLM_MODE: {}", e),
        }
    }
    if let Some(key) = lookup("SOULLINK_API_KEY") {
        config.llm.api.api_key = key;
    }
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides (see [`apply_env_overrides`]).
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}
