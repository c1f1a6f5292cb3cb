use crate::config::TtsConfig;
use crate::error::VoiceError;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for one synthesis request.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'static str,
}

/// Service for generating speech from text through an OpenAI-compatible
/// `audio/speech` endpoint. Audio comes back as MP3.
#[derive(Debug, Clone)]
pub struct TtsService {
    http: reqwest::Client,
    config: TtsConfig,
}

impl TtsService {
    pub fn new(config: TtsConfig) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder()
            .timeout(TTS_TIMEOUT)
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Enabled in configuration and a key is present.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.api_key.trim().is_empty()
    }

    /// Synthesizes `text` with `voice`, or the configured voice when `None`.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>, VoiceError> {
        if self.config.api_key.trim().is_empty() {
            return Err(VoiceError::Config("TTS API key is not configured".to_string()));
        }
        if text.trim().is_empty() {
            return Err(VoiceError::Tts("text is empty".to_string()));
        }
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }
        if !(0.25..=4.0).contains(&self.config.speed) {
            return Err(VoiceError::Config(
                "Speed must be between 0.25 and 4.0".to_string(),
            ));
        }

        let voice = voice
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&self.config.voice);
        let body = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice,
            speed: self.config.speed,
            response_format: "mp3",
        };
        let url = format!("{}/audio/speech", self.config.base_url.trim_end_matches('/'));

        tracing::debug!(voice, chars = text.chars().count(), "requesting speech synthesis");
        let started = Instant::now();

        let response = self
            .http
            .post(url)
            .bearer_auth(self.config.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Tts(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!(
                "TTS API returned {}: {}",
                status, detail
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Tts(format!("failed to read audio: {}", e)))?;

        tracing::info!(
            voice,
            bytes = audio.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "speech synthesized"
        );
        Ok(audio.to_vec())
    }
}
