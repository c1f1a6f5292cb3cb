//! SoulLink server binary.
//!
//! Loads configuration, picks the expression strategy, scans the model catalog
//! and serves the HTTP and WebSocket surface until SIGTERM/SIGINT.

use soullink_catalog::Catalog;
use soullink_server::{app, background, build_orchestrator, config, AppState};
use soullink_voice::{SttService, TtsService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("SOULLINK_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let orchestrator =
        build_orchestrator(&config.llm).expect("failed to build generation backends");
    tracing::info!(
        strategy = %orchestrator.strategy_kind(),
        call_timeout_secs = config.llm.call_timeout().as_secs(),
        "expression strategy selected"
    );

    let catalog = Catalog::new(config.server.model_dirs.clone());
    let scanned = {
        let catalog = catalog.clone();
        tokio::task::spawn_blocking(move || catalog.rescan())
            .await
            .expect("initial catalog scan panicked")
    };
    tracing::info!(models = scanned, "model catalog loaded");

    let tts_service =
        TtsService::new(config.voice.tts.clone()).expect("failed to initialize TTS service");
    let stt_service = SttService::from_config(&config.voice.asr);
    if stt_service.is_available() {
        tracing::info!("server-side speech recognition enabled");
    }

    let watch_settings = config.catalog.watch_settings();
    let addr = SocketAddr::new(config.server.host, config.server.port);

    let state = AppState::new(config, orchestrator, catalog, tts_service, stt_service);
    tokio::spawn(background::start_catalog_broadcast_task(
        Arc::new(state.clone()),
        watch_settings,
    ));

    let app = app(state);

    tracing::info!(%addr, "starting soullink server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    tracing::info!("soullink server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
