//! HTTP handlers for the SoulLink server.

use crate::config::FrontendConfig;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Multipart},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use soullink_catalog::CatalogEntry;
use soullink_voice::VoiceError;
use std::sync::Arc;
use thiserror::Error;

/// Upper bound for `POST /api/asr` bodies.
pub const MAX_AUDIO_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AsrResponse {
    pub text: String,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream failure: {0}")]
    BadGateway(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<VoiceError> for ApiError {
    fn from(e: VoiceError) -> Self {
        match e {
            VoiceError::Config(msg) => ApiError::InternalServerError(msg),
            VoiceError::Tts(msg) | VoiceError::Stt(msg) => ApiError::BadGateway(msg),
        }
    }
}

/// Handler for `GET /api/models`.
pub async fn list_models_handler(Extension(state): Extension<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.catalog.entries(),
    })
}

/// Handler for `GET /api/config`. Never includes credentials.
pub async fn frontend_config_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<FrontendConfig> {
    Json(state.config.frontend())
}

/// Handler for `POST /api/tts`.
///
/// Returns MP3 audio. 404 when synthesis is disabled or has no key.
pub async fn tts_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<TtsRequest>,
) -> Result<Response, ApiError> {
    if !state.tts_service.is_enabled() {
        return Err(ApiError::NotFound("TTS is disabled".to_string()));
    }
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text is required".to_string()));
    }

    let audio = state
        .tts_service
        .synthesize(&payload.text, payload.voice.as_deref())
        .await
        .map_err(|e| {
            tracing::warn!("speech synthesis failed: {}", e);
            ApiError::from(e)
        })?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

/// Handler for `POST /api/asr`.
///
/// Expects a multipart body with an `audio` field. 404 unless server-side
/// recognition is enabled and its model is present.
pub async fn asr_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AsrResponse>, ApiError> {
    if !state.stt_service.is_available() {
        return Err(ApiError::NotFound("server-side ASR is disabled".to_string()));
    }

    let mut audio = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("multipart error: {}", e)))?
    {
        if field.name() == Some("audio") {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;
            audio = Some(data);
            break;
        }
    }

    let audio = audio.ok_or_else(|| ApiError::BadRequest("no audio provided".to_string()))?;
    if audio.is_empty() {
        return Err(ApiError::BadRequest("audio is empty".to_string()));
    }

    let text = state.stt_service.transcribe(&audio).await.map_err(|e| {
        tracing::warn!("transcription failed: {}", e);
        ApiError::from(e)
    })?;

    Ok(Json(AsrResponse { text }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_errors_map_to_statuses() {
        let config = ApiError::from(VoiceError::Config("no key".to_string())).into_response();
        assert_eq!(config.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let upstream = ApiError::from(VoiceError::Tts("503".to_string())).into_response();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }
}
