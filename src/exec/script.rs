// src/exec/script.rs

//! Transforms backed by files in the steps directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use super::transform::Transform;

/// Serializes notebook execution across the whole process.
pub static NOTEBOOK_LOCK: Mutex<()> = Mutex::new(());

/// Acquire [`NOTEBOOK_LOCK`]. The lock is released when the guard drops,
/// including on early returns and panics.
pub fn notebook_guard() -> MutexGuard<'static, ()> {
    NOTEBOOK_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs `<interpreter> <script> <dest_dir>` with `DEST_DIR` in the
/// environment, from the script's directory.
#[derive(Debug, Clone)]
pub struct ScriptTransform {
    /// Interpreter command line, e.g. `python3` or `uv run python`.
    pub interpreter: String,
    pub script: PathBuf,
}

impl ScriptTransform {
    pub fn new(interpreter: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
        }
    }

    fn command(&self, dest_dir: &Path) -> Result<Command> {
        let mut parts = self.interpreter.split_whitespace();
        let Some(program) = parts.next() else {
            bail!("empty interpreter for {:?}", self.script);
        };

        let mut cmd = Command::new(program);
        cmd.args(parts)
            .arg(&self.script)
            .arg(dest_dir)
            .env("DEST_DIR", dest_dir);
        if let Some(dir) = self.script.parent() {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

impl Transform for ScriptTransform {
    fn run(&self, step: &str, dest_dir: &Path) -> Result<()> {
        let mut cmd = self.command(dest_dir)?;
        debug!(step, ?cmd, "running script");

        let status = cmd
            .status()
            .with_context(|| format!("failed to launch {:?}", self.interpreter))?;
        if !status.success() {
            bail!("script {:?} exited with {status}", self.script);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} {}", self.interpreter, self.script.display())
    }
}

/// Executes a parameterised notebook with the configured notebook command.
///
/// The command is invoked as
/// `<command...> <notebook> <tmp>/notebook.ipynb -p dest_dir <dest_dir>`,
/// with its output captured to a log file that is surfaced on failure.
#[derive(Debug, Clone)]
pub struct NotebookTransform {
    pub command: Vec<String>,
    pub notebook: PathBuf,
}

impl NotebookTransform {
    pub fn new(command: Vec<String>, notebook: impl Into<PathBuf>) -> Self {
        Self {
            command,
            notebook: notebook.into(),
        }
    }
}

impl Transform for NotebookTransform {
    fn run(&self, step: &str, dest_dir: &Path) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("empty notebook command");
        };

        let _guard = notebook_guard();

        let tmp = tempfile::tempdir().context("creating notebook scratch dir")?;
        let out = tmp.path().join("notebook.ipynb");
        let log_path = tmp.path().join("output.log");
        let log = File::create(&log_path).context("creating notebook log")?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(&self.notebook)
            .arg(&out)
            .args(["-p", "dest_dir"])
            .arg(dest_dir)
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log));
        if let Some(dir) = self.notebook.parent() {
            cmd.current_dir(dir);
        }

        info!(step, notebook = ?self.notebook, "executing notebook");
        let status = cmd
            .status()
            .with_context(|| format!("failed to launch {program:?}"))?;
        if !status.success() {
            let output = std::fs::read_to_string(&log_path).unwrap_or_default();
            bail!(
                "notebook {:?} exited with {status}\n{output}",
                self.notebook
            );
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("notebook {}", self.notebook.display())
    }
}
