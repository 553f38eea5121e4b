// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `etl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "etl",
    version,
    about = "Build the datasets of a step DAG, running only what is stale.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `ETL_CONFIG`, then `etl.toml` in the current working
    /// directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ETL_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the selected steps and everything they depend on.
    Run(RunArgs),

    /// Execute a single data step in this process (used for isolated runs).
    #[command(name = "run-step", hide = true)]
    RunStep {
        /// Step identifier, e.g. `data://garden/energy/2023-01-01/primary_energy`.
        uri: String,
        /// Directory the step must write its dataset to.
        dest_dir: String,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Regexes selecting the steps to run. Empty means the whole DAG.
    #[arg(value_name = "PATTERN")]
    pub patterns: Vec<String>,

    /// Regexes for steps to leave out.
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Also run steps that depend on the selected ones.
    #[arg(long)]
    pub downstream: bool,

    /// Run only the selected steps, not their dependencies.
    #[arg(long)]
    pub only: bool,

    /// Run steps even if they are up to date.
    #[arg(long)]
    pub force: bool,

    /// Include private steps.
    #[arg(long)]
    pub private: bool,

    /// Include publication (`grapher://`) steps.
    #[arg(long)]
    pub publish: bool,

    /// Print the steps that would run, without running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Keep running and re-run when step files or the DAG change.
    #[arg(long)]
    pub watch: bool,

    /// Worker threads for staleness checks (overrides `[run].workers`).
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Download datasets from the remote catalog when they match.
    #[arg(long)]
    pub prefer_download: bool,

    /// Run transforms in this process instead of a child process.
    #[arg(long)]
    pub in_process: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
