//! Debounced catalog change notification.
//!
//! A poller compares descriptor fingerprints and emits a raw event on every
//! difference. The debouncer collapses bursts of raw events: each event resets
//! the quiet timer, and one settled signal is emitted once the timer expires.
//! Each settled signal triggers exactly one rescan.

use crate::scanner;
use crate::Catalog;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

/// Timing for the catalog watcher.
#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub debounce: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            debounce: Duration::from_secs(1),
        }
    }
}

type Fingerprint = BTreeMap<PathBuf, Option<SystemTime>>;

async fn current_fingerprint(dirs: &[PathBuf]) -> Option<Fingerprint> {
    let dirs = dirs.to_vec();
    match tokio::task::spawn_blocking(move || scanner::fingerprint(&dirs)).await {
        Ok(print) => Some(print),
        Err(e) => {
            tracing::error!("catalog fingerprint task failed: {}", e);
            None
        }
    }
}

/// Emits `()` on `events` whenever the descriptor fingerprint changes.
/// Returns when the receiving side is dropped.
pub async fn poll_changes(dirs: Vec<PathBuf>, interval: Duration, events: mpsc::Sender<()>) {
    let mut last = current_fingerprint(&dirs).await.unwrap_or_default();

    loop {
        sleep(interval).await;
        if events.is_closed() {
            return;
        }

        let Some(next) = current_fingerprint(&dirs).await else {
            continue;
        };
        if next != last {
            tracing::debug!(descriptors = next.len(), "model descriptor change detected");
            last = next;
            if events.send(()).await.is_err() {
                return;
            }
        }
    }
}

/// Forwards one `()` on `settled` after each burst of `events` followed by
/// `quiet` without further events. Returns when either side closes.
pub async fn debounce<T>(mut events: mpsc::Receiver<T>, quiet: Duration, settled: mpsc::Sender<()>) {
    while events.recv().await.is_some() {
        let mut closed = false;
        loop {
            match timeout(quiet, events.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        if settled.send(()).await.is_err() || closed {
            return;
        }
    }
}

/// Starts the poll, debounce and rescan tasks for `catalog`.
///
/// The returned receiver yields the new entry count after every debounced
/// rescan. Dropping it stops all three tasks.
pub fn watch(catalog: Catalog, settings: WatchSettings) -> mpsc::Receiver<usize> {
    let (event_tx, event_rx) = mpsc::channel(16);
    let (settled_tx, mut settled_rx) = mpsc::channel(1);
    let (out_tx, out_rx) = mpsc::channel(4);

    tracing::info!(
        dirs = catalog.dirs().len(),
        poll_ms = settings.poll_interval.as_millis() as u64,
        debounce_ms = settings.debounce.as_millis() as u64,
        "catalog watcher started"
    );

    tokio::spawn(poll_changes(
        catalog.dirs().to_vec(),
        settings.poll_interval,
        event_tx,
    ));
    tokio::spawn(debounce(event_rx, settings.debounce, settled_tx));
    tokio::spawn(async move {
        while settled_rx.recv().await.is_some() {
            tracing::info!("model files changed, rescanning catalog");
            let scanning = catalog.clone();
            let count = match tokio::task::spawn_blocking(move || scanning.rescan()).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::error!("catalog rescan task failed: {}", e);
                    continue;
                }
            };
            if out_tx.send(count).await.is_err() {
                return;
            }
        }
    });

    out_rx
}
