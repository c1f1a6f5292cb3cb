//! Background tasks for the SoulLink server.
//!
//! Includes:
//! - Re-announcing the model catalog after the watcher rescans it.

use crate::{api_ws, AppState};
use soullink_catalog::watcher::{self, WatchSettings};
use std::sync::Arc;

/// Starts the catalog watch task.
///
/// Runs until the watcher stops. After every settled burst of filesystem
/// changes the catalog is rescanned and a fresh `model_list` goes to every
/// connected client.
pub async fn start_catalog_broadcast_task(state: Arc<AppState>, settings: WatchSettings) {
    tracing::info!(
        poll_interval_ms = settings.poll_interval.as_millis() as u64,
        debounce_ms = settings.debounce.as_millis() as u64,
        "starting catalog watch task"
    );

    let mut rescans = watcher::watch(state.catalog.clone(), settings);
    while let Some(count) = rescans.recv().await {
        let delivered = state.hub.broadcast(&api_ws::model_list(&state)).await;
        tracing::info!(models = count, clients = delivered, "catalog change announced");
    }

    tracing::warn!("catalog watch task stopped");
}
