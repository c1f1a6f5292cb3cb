//! Filesystem scan for Live2D model bundles.
//!
//! A bundle is identified by a `*.model3.json` descriptor. Its companion files
//! (display info, physics, pose) live beside it and its motions live in a
//! `motions/` subdirectory.

use crate::CatalogError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

const MODEL_SUFFIX: &str = ".model3.json";
const CDI_SUFFIX: &str = ".cdi3.json";
const PHYSICS_SUFFIX: &str = ".physics3.json";
const POSE_SUFFIX: &str = ".pose3.json";
const MOTION_SUFFIX: &str = ".motion3.json";

/// One model bundle as advertised to presentation clients.
///
/// `path` and `directory` are web paths prefixed with the name of the base
/// directory the bundle was found under, e.g. `l2d/amane/amane.model3.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub path: String,
    pub directory: String,
    pub model_file: String,
    pub cdi_file: Option<String>,
    pub physics_file: Option<String>,
    pub pose_file: Option<String>,
    #[serde(default)]
    pub motions: Vec<String>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

fn is_model_descriptor(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(MODEL_SUFFIX))
}

/// Every `*.model3.json` under `base`, skipping dot-directories and entries
/// that cannot be read.
fn model_descriptors(base: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(base)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter(is_model_descriptor)
}

fn web_path(prefix: &str, relative: &Path) -> String {
    let mut out = String::from(prefix);
    for component in relative.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}

fn files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<String>, CatalogError> {
    let read = fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names: Vec<String> = read
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(suffix))
        .collect();
    names.sort();
    Ok(names)
}

/// Builds the catalog entry for one descriptor found under `base`.
pub fn parse_entry(descriptor: &Path, base: &Path) -> Result<CatalogEntry, CatalogError> {
    let invalid = |reason: &str| CatalogError::Invalid {
        path: descriptor.to_path_buf(),
        reason: reason.to_string(),
    };

    let model_file = descriptor
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| invalid("file name is not valid UTF-8"))?
        .to_string();
    let name = model_file.trim_end_matches(MODEL_SUFFIX).to_string();
    let model_dir = descriptor.parent().ok_or_else(|| invalid("no parent directory"))?;

    let prefix = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let relative_file = descriptor
        .strip_prefix(base)
        .map_err(|_| invalid("outside of base directory"))?;
    let relative_dir = model_dir
        .strip_prefix(base)
        .map_err(|_| invalid("outside of base directory"))?;

    let siblings = fs::read_dir(model_dir)
        .map_err(|source| CatalogError::Io {
            path: model_dir.to_path_buf(),
            source,
        })?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect::<Vec<_>>();
    let sibling = |suffix: &str| {
        let mut matches: Vec<&String> = siblings.iter().filter(|n| n.ends_with(suffix)).collect();
        matches.sort();
        matches.first().map(|n| n.to_string())
    };

    let motions_dir = model_dir.join("motions");
    let motions = if motions_dir.is_dir() {
        files_with_suffix(&motions_dir, MOTION_SUFFIX)?
    } else {
        Vec::new()
    };

    Ok(CatalogEntry {
        name,
        path: web_path(&prefix, relative_file),
        directory: web_path(&prefix, relative_dir),
        model_file,
        cdi_file: sibling(CDI_SUFFIX),
        physics_file: sibling(PHYSICS_SUFFIX),
        pose_file: sibling(POSE_SUFFIX),
        motions,
    })
}

/// Scans every base directory. Entries are keyed by name; a later bundle with
/// the same name replaces an earlier one. Missing directories are skipped.
pub fn scan(base_dirs: &[PathBuf]) -> BTreeMap<String, CatalogEntry> {
    let mut entries = BTreeMap::new();

    for base in base_dirs {
        if !base.is_dir() {
            tracing::warn!(dir = %base.display(), "model directory does not exist, skipping");
            continue;
        }

        for descriptor in model_descriptors(base) {
            match parse_entry(descriptor.path(), base) {
                Ok(entry) => {
                    tracing::debug!(name = %entry.name, path = %entry.path, "found model");
                    entries.insert(entry.name.clone(), entry);
                }
                Err(e) => tracing::warn!("skipping model: {}", e),
            }
        }
    }

    entries
}

/// Snapshot of every descriptor path with its modification time. Two equal
/// fingerprints mean no descriptor was added, removed or touched.
pub fn fingerprint(base_dirs: &[PathBuf]) -> BTreeMap<PathBuf, Option<SystemTime>> {
    base_dirs
        .iter()
        .filter(|base| base.is_dir())
        .flat_map(|base| model_descriptors(base))
        .map(|entry| {
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            (entry.into_path(), modified)
        })
        .collect()
}
