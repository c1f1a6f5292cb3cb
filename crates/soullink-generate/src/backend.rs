//! Minimal client for OpenAI-compatible `chat/completions` endpoints.

use crate::config::ApiConfig;
use crate::error::GenerateError;
use serde::{Deserialize, Serialize};
use soullink_types::ChatTurn;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One configured completions endpoint. Each call is a single exchange; there
/// are no retries.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl CompletionClient {
    pub fn new(config: ApiConfig) -> Result<Self, GenerateError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GenerateError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Submits `messages` and returns the first choice's text.
    pub async fn complete(&self, messages: &[ChatTurn]) -> Result<String, GenerateError> {
        if !self.config.has_credentials() {
            return Err(GenerateError::Config(format!(
                "API key for {} is not configured",
                self.config.provider
            )));
        }

        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .http
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(self.config.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerateError::Backend(format!(
                "{} returned {}: {}",
                self.config.provider, status, detail
            )));
        }

        let decoded: CompletionResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        decoded
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerateError::Backend("response contained no message content".to_string()))
    }

    fn transport_error(&self, e: reqwest::Error) -> GenerateError {
        if e.is_timeout() {
            GenerateError::Timeout(self.config.timeout())
        } else if e.is_decode() {
            GenerateError::Backend(format!("failed to decode response: {}", e))
        } else {
            GenerateError::Backend(format!("request failed: {}", e))
        }
    }
}
