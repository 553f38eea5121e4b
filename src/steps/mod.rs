// src/steps/mod.rs

//! Step model.
//!
//! Every node of the DAG becomes a [`Step`]: an enum over the supported step
//! kinds, each implementing [`StepOps`]. A step owns its dependency subtree;
//! a dependency shared by two branches is simply built twice.
//!
//! - [`uri`] parses identifiers and extracts their attributes.
//! - [`factory`] turns identifiers into steps.
//! - One module per step kind: [`data`], [`archive`], [`snapshot`],
//!   [`publication`], [`github`], [`etag`].

pub mod archive;
pub mod data;
pub mod etag;
pub mod factory;
pub mod github;
pub mod hooks;
pub mod publication;
pub mod snapshot;
pub mod uri;

use std::fmt;

pub use archive::ArchiveStep;
pub use data::DataStep;
pub use etag::ETagStep;
pub use factory::parse_step;
pub use github::GithubStep;
pub use hooks::PostRunHook;
pub use publication::PublicationStep;
pub use snapshot::SnapshotStep;
pub use uri::{Scheme, StepAttributes, StepUri, Visibility, step_attributes};

use crate::cache::DirtyCache;
use crate::context::Context;
use crate::errors::Result;

/// Operations shared by every step kind.
pub trait StepOps {
    fn scheme(&self) -> Scheme;

    /// Path part of the identifier (everything after `://`).
    fn path(&self) -> &str;

    /// Full identifier, `scheme://path`.
    fn uri(&self) -> String {
        format!("{}://{}", self.scheme(), self.path())
    }

    fn is_public(&self) -> bool {
        !self.scheme().is_private()
    }

    fn dependencies(&self) -> &[Step] {
        &[]
    }

    /// Produce the step's output.
    fn run(&self, ctx: &Context) -> Result<()>;

    /// Whether the step must run. Dependencies are checked through `cache`.
    fn is_dirty(&self, ctx: &Context, cache: &DirtyCache) -> Result<bool>;

    /// Fingerprint of everything that goes into building the step.
    fn checksum_input(&self, ctx: &Context) -> Result<String>;

    /// Fingerprint seen by dependents.
    fn checksum_output(&self, ctx: &Context) -> Result<String> {
        self.checksum_input(ctx)
    }
}

/// A parsed, runnable step.
#[derive(Debug, Clone)]
pub enum Step {
    Data(DataStep),
    Archive(ArchiveStep),
    Snapshot(SnapshotStep),
    Publication(PublicationStep),
    Github(GithubStep),
    ETag(ETagStep),
}

macro_rules! dispatch {
    ($self:expr, $s:ident => $e:expr) => {
        match $self {
            Step::Data($s) => $e,
            Step::Archive($s) => $e,
            Step::Snapshot($s) => $e,
            Step::Publication($s) => $e,
            Step::Github($s) => $e,
            Step::ETag($s) => $e,
        }
    };
}

impl StepOps for Step {
    fn scheme(&self) -> Scheme {
        dispatch!(self, s => s.scheme())
    }

    fn path(&self) -> &str {
        dispatch!(self, s => s.path())
    }

    fn is_public(&self) -> bool {
        dispatch!(self, s => s.is_public())
    }

    fn dependencies(&self) -> &[Step] {
        dispatch!(self, s => s.dependencies())
    }

    fn run(&self, ctx: &Context) -> Result<()> {
        dispatch!(self, s => s.run(ctx))
    }

    /// Memoized per identifier in `cache`.
    fn is_dirty(&self, ctx: &Context, cache: &DirtyCache) -> Result<bool> {
        cache.get_or_try_insert_with(&self.uri(), || dispatch!(self, s => s.is_dirty(ctx, cache)))
    }

    fn checksum_input(&self, ctx: &Context) -> Result<String> {
        dispatch!(self, s => s.checksum_input(ctx))
    }

    fn checksum_output(&self, ctx: &Context) -> Result<String> {
        dispatch!(self, s => s.checksum_output(ctx))
    }
}

impl Step {
    pub fn attributes(&self) -> Result<StepAttributes> {
        step_attributes(&self.uri())
    }

    /// Version segment of the path (`latest` for etag and github steps).
    pub fn version(&self) -> Result<String> {
        Ok(self.attributes()?.version)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

impl PartialEq for Step {
    /// Two steps are the same step iff their identifiers are equal.
    fn eq(&self, other: &Self) -> bool {
        self.uri() == other.uri()
    }
}

impl Eq for Step {}
