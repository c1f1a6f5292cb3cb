//! Voice services for the SoulLink hub.
//!
//! Speech synthesis goes through an OpenAI-compatible `audio/speech`
//! endpoint; transcription runs a local whisper.cpp-style binary. Browser-side
//! recognition needs nothing from the server beyond its configuration.

pub mod config;
pub mod error;
pub mod stt;
pub mod tts;

pub use config::{AsrConfig, AsrMode, LocalAsrConfig, TtsConfig, VoiceConfig};
pub use error::VoiceError;
pub use stt::SttService;
pub use tts::TtsService;
