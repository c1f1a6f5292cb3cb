use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "zh-CN".to_string()
}

fn default_tts_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "alloy".to_string()
}

fn default_tts_speed() -> f32 {
    1.0
}

fn default_whisper_binary() -> PathBuf {
    PathBuf::from("whisper-cli")
}

fn default_whisper_model() -> PathBuf {
    PathBuf::from("./models/ggml-base.bin")
}

/// `[voice]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub asr: AsrConfig,
    #[serde(default)]
    pub tts: TtsConfig,
}

/// Where speech recognition happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsrMode {
    /// In the presentation client; the server only passes settings along.
    #[default]
    Browser,
    /// On the server through [`crate::SttService`].
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAsrConfig {
    #[serde(default = "default_whisper_binary")]
    pub binary_path: PathBuf,
    #[serde(default = "default_whisper_model")]
    pub model_path: PathBuf,
}

impl Default for LocalAsrConfig {
    fn default() -> Self {
        Self {
            binary_path: default_whisper_binary(),
            model_path: default_whisper_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: AsrMode,
    /// BCP 47 tag such as `zh-CN`; only the primary subtag reaches the recognizer.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub auto_send: bool,
    #[serde(default)]
    pub local: LocalAsrConfig,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: AsrMode::default(),
            language: default_language(),
            auto_send: true,
            local: LocalAsrConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tts_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default = "default_tts_voice")]
    pub voice: String,
    #[serde(default = "default_tts_speed")]
    pub speed: f32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_tts_base_url(),
            api_key: String::new(),
            model: default_tts_model(),
            voice: default_tts_voice(),
            speed: default_tts_speed(),
        }
    }
}

impl fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("speed", &self.speed)
            .finish()
    }
}
