//! Presentation asset catalog for the SoulLink hub.
//!
//! [`Catalog`] holds the last scan of the configured model directories;
//! [`watcher`] turns filesystem changes into debounced rescan signals.

pub mod scanner;
pub mod watcher;

pub use scanner::CatalogEntry;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model descriptor {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Shared, cheaply cloneable snapshot of the model catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    dirs: Arc<Vec<PathBuf>>,
    entries: Arc<RwLock<Arc<BTreeMap<String, CatalogEntry>>>>,
}

impl Catalog {
    /// Creates an empty catalog over `dirs`. Call [`rescan`](Self::rescan) to populate it.
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs: Arc::new(dirs),
            entries: Arc::new(RwLock::new(Arc::new(BTreeMap::new()))),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Scans the directories and swaps in the result. Blocks on filesystem IO.
    pub fn rescan(&self) -> usize {
        let scanned = scanner::scan(&self.dirs);
        let count = scanned.len();
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(scanned);
        tracing::info!(count, "model catalog scanned");
        count
    }

    fn snapshot(&self) -> Arc<BTreeMap<String, CatalogEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.snapshot().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<CatalogEntry> {
        self.snapshot().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
