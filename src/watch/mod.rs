// src/watch/mod.rs

//! Watch mode.
//!
//! Turns filesystem changes under the steps directory and the DAG directory
//! into batches of changed paths. Each batch makes the CLI reload the DAG and
//! run the selection again; the staleness check then decides what actually
//! needs to run, so the watcher itself does not care which file changed.

pub mod path_utils;
pub mod watcher;

use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigFile;

pub use watcher::{WatcherHandle, next_batch, spawn_watcher};

/// How long the tree must be quiet before a batch of changes is handed over.
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Directories watched for a given config.
pub fn watch_roots(cfg: &ConfigFile) -> Vec<PathBuf> {
    let mut roots = vec![cfg.paths.steps_dir.clone(), cfg.dag_dir().to_path_buf()];
    roots.sort();
    roots.dedup();
    roots
}

/// Directories whose changes never trigger a run, even when a watched root
/// contains them. The data directory is written by every run.
pub fn ignored_dirs(cfg: &ConfigFile) -> Vec<PathBuf> {
    let data = &cfg.paths.data_dir;
    let mut dirs = vec![data.clone()];
    // Some backends report canonical paths (`/private/var` on macOS).
    if let Ok(canon) = data.canonicalize() {
        if canon != *data {
            dirs.push(canon);
        }
    }
    dirs
}
