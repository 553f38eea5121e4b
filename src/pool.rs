// src/pool.rs

//! Bounded rayon pools for the parallel regions of a run.

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::errors::{EtlError, Result};

/// Build a dedicated pool with `workers` threads named `<label>-<n>`.
///
/// Each parallel region gets its own pool so that a worker count from the
/// config is an actual bound, independent of rayon's global pool.
pub fn bounded_pool(workers: usize, label: &'static str) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(move |i| format!("{label}-{i}"))
        .build()
        .map_err(|e| EtlError::Other(anyhow::anyhow!("failed to build {label} pool: {e}")))
}
