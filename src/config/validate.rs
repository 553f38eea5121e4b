// src/config/validate.rs

use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{EtlError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::EtlError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_run_section(cfg)?;
    validate_remote_section(cfg)?;
    validate_exec_section(cfg)?;
    Ok(())
}

fn validate_run_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.run.workers == 0 {
        return Err(EtlError::Config(
            "[run].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.run.publish_workers == 0 {
        return Err(EtlError::Config(
            "[run].publish_workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(ref filter) = cfg.run.publish_filter {
        Regex::new(filter).map_err(|e| {
            EtlError::Config(format!("[run].publish_filter is not a valid regex: {e}"))
        })?;
    }

    if cfg.run.max_virtual_memory == Some(0) {
        return Err(EtlError::Config(
            "[run].max_virtual_memory must be > 0 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_remote_section(cfg: &RawConfigFile) -> Result<()> {
    let urls = [
        ("catalog_url", &cfg.remote.catalog_url),
        ("storage_url", &cfg.remote.storage_url),
        ("snapshot_url", &cfg.remote.snapshot_url),
        ("github_url", &cfg.remote.github_url),
    ];
    for (name, url) in urls {
        if url.trim().is_empty() {
            return Err(EtlError::Config(format!("[remote].{name} must not be empty")));
        }
    }
    Ok(())
}

fn validate_exec_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.exec.notebook_command.is_empty() {
        return Err(EtlError::Config(
            "[exec].notebook_command must name a program".to_string(),
        ));
    }
    for (ext, cmd) in cfg.exec.interpreters.iter() {
        if cmd.trim().is_empty() {
            return Err(EtlError::Config(format!(
                "[exec.interpreters].{ext} must name a program"
            )));
        }
    }
    Ok(())
}
