// src/dag/loader.rs

//! Load the declarative step-dependency documents into a [`Graph`].
//!
//! A document looks like:
//!
//! ```yaml
//! steps:
//!   data://meadow/energy/2023-01-01/primary_energy:
//!     - snapshot://energy/2023-01-01/primary_energy.csv
//!   data://garden/energy/2023-01-01/primary_energy:
//!     - data://meadow/energy/2023-01-01/primary_energy
//! include:
//!   - dag/fasttrack.yml
//! ```
//!
//! Included documents are loaded depth-first and merged into one graph. A
//! step defined in two merged documents is an error; nothing is silently
//! overridden.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::config::ConfigFile;
use crate::dag::graph::Graph;
use crate::errors::{EtlError, Result};

/// Raw YAML shape of a DAG document.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DagDocument {
    /// `null` and a missing key both mean "no steps".
    #[serde(default)]
    pub steps: Option<BTreeMap<String, Option<Vec<String>>>>,

    #[serde(default)]
    pub include: Vec<String>,
}

/// Steps whose identifier contains `marker` may only be declared in the
/// document whose file name is `document`.
#[derive(Debug, Clone)]
pub struct RestrictedPolicy {
    pub marker: String,
    pub document: String,
}

impl RestrictedPolicy {
    fn allows(&self, document: &Path) -> bool {
        document
            .file_name()
            .map(|n| n.to_string_lossy() == self.document.as_str())
            .unwrap_or(false)
    }
}

/// Recursive DAG loader.
#[derive(Debug, Clone)]
pub struct DagLoader {
    base_dir: PathBuf,
    policy: RestrictedPolicy,
}

impl DagLoader {
    /// `base_dir` is the directory include paths are resolved against.
    pub fn new(base_dir: impl Into<PathBuf>, policy: RestrictedPolicy) -> Self {
        Self {
            base_dir: base_dir.into(),
            policy,
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(
            cfg.paths.base_dir.clone(),
            RestrictedPolicy {
                marker: cfg.dag.restricted_marker.clone(),
                document: cfg.dag.restricted_document.clone(),
            },
        )
    }

    /// Load `path` and every document it includes into one graph.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Graph> {
        self.load_into(path.as_ref(), Graph::new())
    }

    fn load_into(&self, path: &Path, prev: Graph) -> Result<Graph> {
        let doc = read_document(path)?;
        let current = parse_steps(&doc);

        self.check_restricted(path, &current)?;

        let duplicates: Vec<String> = current
            .keys()
            .filter(|k| prev.contains_key(*k))
            .cloned()
            .collect();
        if !duplicates.is_empty() {
            return Err(EtlError::DuplicateStep {
                document: path.to_path_buf(),
                steps: duplicates,
            });
        }

        debug!(document = ?path, steps = current.len(), "loaded DAG document");

        let mut merged = prev;
        merged.extend(current);

        for sub in doc.include.iter() {
            let sub_path = self.base_dir.join(sub);
            merged = self.load_into(&sub_path, merged)?;
        }

        Ok(merged)
    }

    fn check_restricted(&self, path: &Path, steps: &Graph) -> Result<()> {
        if self.policy.allows(path) {
            return Ok(());
        }
        let restricted: Vec<String> = steps
            .keys()
            .filter(|s| s.contains(self.policy.marker.as_str()))
            .cloned()
            .collect();
        if restricted.is_empty() {
            Ok(())
        } else {
            Err(EtlError::RestrictedStep {
                document: path.to_path_buf(),
                steps: restricted,
            })
        }
    }
}

/// Convenience: load the root DAG document named in the config.
pub fn load_dag(cfg: &ConfigFile) -> Result<Graph> {
    DagLoader::from_config(cfg).load(&cfg.paths.dag_file)
}

fn read_document(path: &Path) -> Result<DagDocument> {
    let contents = fs::read_to_string(path).map_err(|e| EtlError::io(path, e))?;
    // An empty file parses as YAML null.
    let doc: Option<DagDocument> =
        serde_yaml::from_str(&contents).map_err(|e| EtlError::Yaml {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(doc.unwrap_or_default())
}

fn parse_steps(doc: &DagDocument) -> Graph {
    doc.steps
        .iter()
        .flatten()
        .map(|(node, deps)| {
            let deps: BTreeSet<String> = deps.iter().flatten().cloned().collect();
            (node.clone(), deps)
        })
        .collect()
}
