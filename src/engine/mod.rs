// src/engine/mod.rs

//! Orchestration engine for etldag.
//!
//! This module ties together:
//! - DAG compilation (filtering, ordering, parsing into steps)
//! - the staleness filter
//! - sequential execution of the selected steps
//!
//! Steps run one at a time, in dependency order. The only parallelism lives
//! inside the staleness check and inside individual steps.

pub mod pipeline;

pub use pipeline::Pipeline;

/// Exclude pattern applied unless private steps are requested.
pub const PRIVATE_PATTERN: &str = "-private://";
/// Exclude pattern applied unless publication steps are requested.
pub const PUBLICATION_PATTERN: &str = "^grapher://";

/// What to run, as chosen by the user.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Regexes selecting steps; empty means the whole DAG.
    pub includes: Vec<String>,
    /// Regexes for steps to leave out of the run.
    pub excludes: Vec<String>,
    /// Also run everything downstream of the selected steps.
    pub downstream: bool,
    /// Run exactly the selected steps, without their dependencies.
    pub only: bool,
    /// Run every selected step, dirty or not.
    pub force: bool,
    /// Include `*-private://` steps.
    pub private: bool,
    /// Include `grapher://` steps.
    pub publish: bool,
}

impl RunOptions {
    /// User excludes plus the implicit ones for private and publication
    /// steps.
    pub fn effective_excludes(&self) -> Vec<String> {
        let mut excludes = self.excludes.clone();
        if !self.private {
            excludes.push(PRIVATE_PATTERN.to_string());
        }
        if !self.publish {
            excludes.push(PUBLICATION_PATTERN.to_string());
        }
        excludes
    }
}

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps selected to run, in order.
    pub planned: Vec<String>,
    /// Steps that actually ran.
    pub executed: Vec<String>,
    /// Set when the run stopped early on request.
    pub interrupted: bool,
}
