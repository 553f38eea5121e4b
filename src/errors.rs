// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Graph resolution and step construction failures are fatal and carry the
//! offending step identifiers in their message. Collaborator traits
//! (`Transform`, `Datastore`, `RemoteCatalog`) speak `anyhow`, which is folded
//! into [`EtlError::Other`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cycle detected in step graph involving '{0}'")]
    Cycle(String),

    #[error("Duplicate steps detected in DAG {document:?}: {steps:?}")]
    DuplicateStep {
        document: PathBuf,
        steps: Vec<String>,
    },

    #[error("Restricted steps detected in DAG {document:?}: {steps:?}")]
    RestrictedStep {
        document: PathBuf,
        steps: Vec<String>,
    },

    #[error("No recipe for executing step: {0}")]
    UnsupportedStep(String),

    #[error("Malformed step '{step}': {reason}")]
    Parse { step: String, reason: String },

    #[error("Cannot construct step '{step}': {reason}")]
    Construction { step: String, reason: String },

    #[error("{0}")]
    NotImplemented(String),

    #[error("Have no idea how to run step: {0}")]
    NoRecipe(String),

    #[error("Step {step} failed in isolated process\nCOMMAND: {command}")]
    IsolatedRunFailed { step: String, command: String },

    #[error("Checksum mismatch for {what}: expected {expected}, got {actual}")]
    Checksum {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("git error: {0}")]
    Git(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Invalid glob: {0}")]
    Glob(#[from] globset::Error),

    #[error("YAML parsing error in {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EtlError {
    /// Attach a path to an `std::io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EtlError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the driver must stop the whole process on this error.
    pub fn is_process_fatal(&self) -> bool {
        matches!(self, EtlError::IsolatedRunFailed { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EtlError>;
