// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{EtlError, Result};

/// Environment variable that can point at the config file.
pub const CONFIG_ENV_VAR: &str = "ETL_CONFIG";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| EtlError::io(path, e))?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// - Reads TOML (a missing file yields the default configuration).
/// - Anchors a relative `paths.base_dir` on the config file's directory.
/// - Checks worker counts, URLs and the publish filter regex.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let exists = path.exists();
    let mut raw = if exists {
        load_from_path(path)?
    } else {
        tracing::debug!(path = ?path, "config file not found; using defaults");
        RawConfigFile::default()
    };

    if raw.paths.base_dir.is_relative() {
        raw.paths.base_dir = config_root_dir(path).join(&raw.paths.base_dir);
    }

    let mut cfg = ConfigFile::try_from(raw)?;
    if exists {
        cfg.source = Some(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
    }
    Ok(cfg)
}

/// Resolve the config path: explicit flag, then `ETL_CONFIG`, then
/// `etl.toml` in the current working directory.
pub fn default_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(p) = explicit {
        return PathBuf::from(p);
    }
    std::env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("etl.toml"))
}

/// Figure out a sensible project root.
///
/// - If the config path has a non-empty parent (e.g. "configs/etl.toml"),
///   we use that directory.
/// - If it's just a bare filename like "etl.toml" (parent = ""),
///   we fall back to the current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
