// src/cache/mod.rs

//! Batch staleness checks.
//!
//! `is_dirty` recurses into dependencies, and the same dependency is usually
//! reachable from many steps. A [`DirtyCache`] makes sure every identifier is
//! evaluated at most once per batch, even when the batch runs on several
//! threads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rayon::prelude::*;
use tracing::debug;

use crate::context::Context;
use crate::errors::Result;
use crate::pool::bounded_pool;
use crate::steps::{Step, StepOps};

type Slot = Arc<Mutex<Option<bool>>>;

/// Step identifier -> staleness, one lock per identifier.
///
/// A slot stays locked while its step is being evaluated, so a second
/// thread asking for the same identifier waits for the first result instead
/// of recomputing it. Slots are only ever locked from a step towards its
/// dependencies, which cannot deadlock on an acyclic graph.
#[derive(Debug, Default)]
pub struct DirtyCache {
    slots: Mutex<HashMap<String, Slot>>,
    evaluations: AtomicUsize,
}

impl DirtyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `key`, or compute it with `f`.
    ///
    /// Errors are not cached.
    pub fn get_or_try_insert_with<F>(&self, key: &str, f: F) -> Result<bool>
    where
        F: FnOnce() -> Result<bool>,
    {
        let slot = Arc::clone(self.lock_slots().entry(key.to_string()).or_default());

        let mut value = slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(dirty) = *value {
            return Ok(dirty);
        }

        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let dirty = f()?;
        *value = Some(dirty);
        debug!(step = key, dirty, "evaluated staleness");
        Ok(dirty)
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        let slot = self.lock_slots().get(key).cloned()?;
        let value = *slot.lock().unwrap_or_else(|e| e.into_inner());
        value
    }

    /// Number of computed (not cached) evaluations since creation.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock_slots().clear();
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keep only the steps that need to run, checked on a pool of `workers`
/// threads. Order is preserved.
pub fn select_dirty_steps(steps: Vec<Step>, ctx: &Context, workers: usize) -> Result<Vec<Step>> {
    let cache = DirtyCache::new();
    select_dirty_steps_with(steps, ctx, workers, &cache)
}

/// Like [`select_dirty_steps`], with a caller-provided cache. The cache is
/// cleared before returning.
pub fn select_dirty_steps_with(
    steps: Vec<Step>,
    ctx: &Context,
    workers: usize,
    cache: &DirtyCache,
) -> Result<Vec<Step>> {
    let pool = bounded_pool(workers, "staleness")?;
    let flags = pool.install(|| {
        steps
            .par_iter()
            .map(|s| s.is_dirty(ctx, cache))
            .collect::<Result<Vec<bool>>>()
    });
    cache.clear();
    let flags = flags?;

    let dirty: Vec<Step> = steps
        .into_iter()
        .zip(flags)
        .filter_map(|(s, dirty)| dirty.then_some(s))
        .collect();

    debug!(dirty = dirty.len(), "selected dirty steps");
    Ok(dirty)
}
