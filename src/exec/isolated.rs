// src/exec/isolated.rs

//! Run a step in a child process.
//!
//! The child is the current executable invoked as
//! `run-step <uri> <dest_dir>`, optionally wrapped in `prlimit` to cap its
//! virtual memory. It resolves the step's recipe itself and runs it
//! in-process, so state cannot leak from one step into the next. Only
//! script recipes are sent here; registered transforms are unknown to a
//! fresh process.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, error};

use crate::config::ConfigFile;
use crate::config::loader::CONFIG_ENV_VAR;
use crate::errors::{EtlError, Result};

/// Hidden CLI subcommand implementing the child side.
pub const RUN_STEP_COMMAND: &str = "run-step";

/// Full argv of the child process for `step`.
pub fn isolated_args(exe: &Path, step: &str, dest_dir: &Path, cfg: &ConfigFile) -> Vec<String> {
    let mut args = Vec::new();

    if cfg!(target_os = "linux") {
        if let Some(limit) = cfg.run.max_virtual_memory {
            args.push("prlimit".to_string());
            args.push(format!("--as={limit}"));
        }
    }

    args.push(exe.to_string_lossy().into_owned());
    args.push(RUN_STEP_COMMAND.to_string());
    args.push(step.to_string());
    args.push(dest_dir.to_string_lossy().into_owned());
    args
}

/// Run `step` in a child process and wait for it.
///
/// A non-zero exit is [`EtlError::IsolatedRunFailed`]; the child has already
/// printed its own error to stderr.
pub fn run_isolated(step: &str, dest_dir: &Path, cfg: &ConfigFile) -> Result<()> {
    let exe = std::env::current_exe()
        .map_err(|e| EtlError::io(PathBuf::from("<current executable>"), e))?;
    let args = isolated_args(&exe, step, dest_dir, cfg);
    let command_line = args.join(" ");

    let Some((program, rest)) = args.split_first() else {
        return Err(EtlError::NoRecipe(step.to_string()));
    };

    let mut cmd = Command::new(program);
    cmd.args(rest);
    if let Some(source) = cfg.source.as_ref() {
        cmd.env(CONFIG_ENV_VAR, source);
    }

    debug!(step, command = %command_line, "spawning isolated step");
    let status = cmd.status().map_err(|e| EtlError::io(PathBuf::from(program), e))?;

    if status.success() {
        Ok(())
    } else {
        error!(step, %status, "isolated step failed");
        Err(EtlError::IsolatedRunFailed {
            step: step.to_string(),
            command: command_line,
        })
    }
}
