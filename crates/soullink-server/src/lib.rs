//! SoulLink server library logic.

pub mod api;
pub mod api_ws;
pub mod background;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use config::{Config, LlmConfig};
use serde_json::{json, Value};
use soullink_catalog::Catalog;
use soullink_generate::{
    select_expression_strategy, ExpressionStrategy, GenerateError, LocalExpression, Orchestrator,
    RemoteChat, RemoteExpression, SchemaStore,
};
use soullink_voice::{SttService, TtsService};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connected presentation clients.
    pub hub: api_ws::ConnectionHub,
    /// Expression and chat generation.
    pub orchestrator: Arc<Orchestrator>,
    /// Model bundles found on disk.
    pub catalog: Catalog,
    /// Name of the last model a client asked to load. Informational only.
    ///
    /// Uses `std::sync::RwLock`: every access is a short read or write that
    /// never spans an `.await`.
    pub current_model: Arc<RwLock<Option<String>>>,
    /// TTS service.
    pub tts_service: Arc<TtsService>,
    /// STT service.
    pub stt_service: Arc<SttService>,
    /// Loaded configuration.
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Orchestrator,
        catalog: Catalog,
        tts_service: TtsService,
        stt_service: SttService,
    ) -> Self {
        Self {
            hub: api_ws::ConnectionHub::new(),
            orchestrator: Arc::new(orchestrator),
            catalog,
            current_model: Arc::new(RwLock::new(None)),
            tts_service: Arc::new(tts_service),
            stt_service: Arc::new(stt_service),
            config: Arc::new(config),
        }
    }

    pub fn current_model(&self) -> Option<String> {
        self.current_model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_current_model(&self, name: &str) {
        *self
            .current_model
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
    }
}

/// Builds the orchestrator described by `[llm]`.
///
/// The expression strategy is chosen once here. In local mode the remote
/// strategy is still built so it can take over when local artifacts are
/// missing.
pub fn build_orchestrator(llm: &LlmConfig) -> Result<Orchestrator, GenerateError> {
    let schema = SchemaStore::new();

    let remote: Arc<dyn ExpressionStrategy> =
        Arc::new(RemoteExpression::new(llm.expression_api(), schema.clone())?);
    let local_config = llm.local.clone();
    let local_schema = schema.clone();
    let expression = select_expression_strategy(
        llm.mode,
        move || -> Arc<dyn ExpressionStrategy> {
            Arc::new(LocalExpression::from_config(local_config, local_schema))
        },
        remote,
    );
    let chat = Arc::new(RemoteChat::new(llm.chat_api())?);

    Ok(Orchestrator::new(expression, chat, schema).with_call_timeout(llm.call_timeout()))
}

/// Maximum request body size (2 MiB) outside the audio upload route.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Path segments owned by the API; asset directories with these names are
/// not mounted.
const RESERVED_SEGMENTS: &[&str] = &["api", "ws", "health"];

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Mounts each existing directory at `/<dir-name>`. Later duplicates of a
/// name are skipped.
fn mount_asset_dirs<'a>(
    mut router: Router,
    dirs: impl IntoIterator<Item = &'a Path>,
    mounted: &mut HashSet<String>,
) -> Router {
    for dir in dirs {
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            tracing::warn!(path = %dir.display(), "asset directory has no name, not serving it");
            continue;
        };
        if !dir.is_dir() {
            tracing::info!(path = %dir.display(), "asset directory not found, skipping");
            continue;
        }
        if RESERVED_SEGMENTS.contains(&name.as_str()) || !mounted.insert(name.clone()) {
            tracing::warn!(path = %dir.display(), mount = %name, "mount point already taken, skipping");
            continue;
        }
        tracing::info!(path = %dir.display(), mount = %name, "serving asset directory");
        router = router.nest_service(&format!("/{}", name), ServeDir::new(dir));
    }
    router
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/api/asr", post(api::asr_handler))
        .layer(DefaultBodyLimit::max(api::MAX_AUDIO_UPLOAD_BYTES));

    let router = Router::new()
        .route("/health", get(health))
        .route("/api/models", get(api::list_models_handler))
        .route("/api/config", get(api::frontend_config_handler))
        .route("/api/tts", post(api::tts_handler))
        .merge(upload_routes)
        .route("/ws", get(api_ws::ws_handler));

    let mut mounted = HashSet::new();
    let router = mount_asset_dirs(
        router,
        state.config.server.model_dirs.iter().map(|d| d.as_path()),
        &mut mounted,
    );
    let router = mount_asset_dirs(
        router,
        state.config.server.static_dirs.iter().map(|d| d.as_path()),
        &mut mounted,
    );

    let frontend_dir = state.config.server.frontend_dir.clone();
    let index = frontend_dir.join("index.html");
    let router = if index.exists() {
        tracing::info!(path = %frontend_dir.display(), "serving presentation client");
        router.fallback_service(ServeDir::new(&frontend_dir).fallback(ServeFile::new(index)))
    } else {
        tracing::info!(path = %frontend_dir.display(), "client directory not found, skipping static file serving");
        router
    };

    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
