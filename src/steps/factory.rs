// src/steps/factory.rs

//! Build [`Step`] values from identifiers.

use crate::dag::graph::Graph;
use crate::errors::Result;
use crate::steps::uri::{Scheme, StepUri};
use crate::steps::{
    ArchiveStep, DataStep, ETagStep, GithubStep, PublicationStep, SnapshotStep, Step,
};

/// Parse `identifier` into a step, building its whole dependency subtree
/// from `graph`.
///
/// Dependencies are fresh values on every call: a dependency reachable
/// through two branches appears twice in the tree.
pub fn parse_step(identifier: &str, graph: &Graph) -> Result<Step> {
    let uri = StepUri::parse(identifier)?;

    let dependencies = graph
        .get(identifier)
        .map(|deps| {
            deps.iter()
                .map(|d| parse_step(d, graph))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let step = match uri.kind()? {
        Scheme::Data => Step::Data(DataStep::new(uri.path, dependencies)?),
        Scheme::DataPrivate => Step::Data(DataStep::private(uri.path, dependencies)?),
        scheme @ (Scheme::Walden | Scheme::WaldenPrivate) => {
            Step::Archive(ArchiveStep::new(uri.path, scheme)?)
        }
        scheme @ (Scheme::Snapshot | Scheme::SnapshotPrivate) => {
            Step::Snapshot(SnapshotStep::new(uri.path, scheme)?)
        }
        Scheme::Grapher => Step::Publication(PublicationStep::new(uri.path, dependencies)?),
        Scheme::Github => Step::Github(GithubStep::new(uri.path)?),
        Scheme::ETag => Step::ETag(ETagStep::new(uri.path)),
    };

    Ok(step)
}
