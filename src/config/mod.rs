// src/config/mod.rs

//! Configuration loading and validation for etldag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like worker counts and regexes (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, DagSection, ExecSection, PathsSection, RawConfigFile, RemoteSection, RunSection,
};
