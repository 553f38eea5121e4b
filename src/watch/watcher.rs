// src/watch/watcher.rs

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use notify::event::EventKind;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::watch::path_utils::{is_relevant, is_under_any};

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive; dropping the handle stops
/// watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch every directory in `roots` recursively and forward the paths of
/// relevant changes to `tx`. Changes below any of `ignored` are dropped.
///
/// Roots that do not exist are skipped.
pub fn spawn_watcher(
    roots: &[PathBuf],
    ignored: &[PathBuf],
    tx: mpsc::UnboundedSender<PathBuf>,
) -> Result<WatcherHandle> {
    let ignored = ignored.to_vec();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                let relevant = event
                    .paths
                    .into_iter()
                    .filter(|p| is_relevant(p) && !is_under_any(p, &ignored));
                for path in relevant {
                    if let Err(err) = tx.send(path) {
                        // Called on notify's thread, outside any span.
                        eprintln!("etl: failed to forward notify event: {err}");
                    }
                }
            }
            Err(err) => {
                eprintln!("etl: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    for root in roots {
        if !root.exists() {
            debug!(?root, "not watching missing directory");
            continue;
        }
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("file watcher started on {:?}", root);
    }

    Ok(WatcherHandle { _inner: watcher })
}

/// Wait for the next change and gather whatever follows within `quiet`.
///
/// Returns `None` once the channel is closed.
pub async fn next_batch(
    rx: &mut mpsc::UnboundedReceiver<PathBuf>,
    quiet: Duration,
) -> Option<Vec<PathBuf>> {
    let first = rx.recv().await?;
    let mut batch = vec![first];

    while let Ok(Some(path)) = timeout(quiet, rx.recv()).await {
        batch.push(path);
    }

    batch.sort();
    batch.dedup();
    Some(batch)
}
