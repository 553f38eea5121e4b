// src/lib.rs

pub mod cache;
pub mod catalog;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pool;
pub mod publish;
pub mod steps;
pub mod watch;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cli::{CliArgs, Command, RunArgs};
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::context::Context;
use crate::dag::load_dag;
use crate::engine::{Pipeline, RunOptions};
use crate::errors::EtlError;
use crate::steps::{DataStep, Scheme, Step, StepOps, StepUri};
use crate::watch::path_utils::relative_str;
use crate::watch::{DEBOUNCE, ignored_dirs, next_batch, spawn_watcher, watch_roots};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - DAG loading and the sequential pipeline
/// - (optional) file watcher
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = default_config_path(args.config.as_deref());

    match args.command {
        Command::Run(run_args) => run_command(&config_path, run_args).await,
        Command::RunStep { uri, dest_dir } => {
            tokio::task::spawn_blocking(move || -> errors::Result<()> {
                let cfg = load_and_validate(&config_path)?;
                let ctx = Context::new(cfg)?;
                run_step(&ctx, &uri, Path::new(&dest_dir))
            })
            .await??;
            Ok(())
        }
    }
}

/// Child side of an isolated run: execute the data step `uri` in this
/// process, writing to `dest_dir`.
pub fn run_step(ctx: &Context, uri: &str, dest_dir: &Path) -> errors::Result<()> {
    let parsed = StepUri::parse(uri)?;
    let step = match parsed.kind()? {
        Scheme::Data => DataStep::new(parsed.path, Vec::new())?,
        Scheme::DataPrivate => DataStep::private(parsed.path, Vec::new())?,
        _ => return Err(EtlError::UnsupportedStep(uri.to_string())),
    };
    debug!(step = %step.uri(), dest = ?dest_dir, "executing step in child process");
    step.execute_in_process(ctx, dest_dir)
}

/// Apply `etl run` flags on top of the config file.
pub fn apply_overrides(cfg: &mut ConfigFile, args: &RunArgs) {
    if let Some(workers) = args.workers {
        cfg.run.workers = workers.max(1);
    }
    if args.prefer_download {
        cfg.run.prefer_download = true;
    }
    if args.in_process {
        cfg.run.in_process = true;
    }
}

pub fn run_options(args: &RunArgs) -> RunOptions {
    RunOptions {
        includes: args.patterns.clone(),
        excludes: args.exclude.clone(),
        downstream: args.downstream,
        only: args.only,
        force: args.force,
        private: args.private,
        publish: args.publish,
    }
}

async fn run_command(config_path: &Path, args: RunArgs) -> Result<()> {
    let mut cfg = load_and_validate(config_path)?;
    apply_overrides(&mut cfg, &args);
    let opts = run_options(&args);

    // Ctrl-C -> finish the current step, start no new one.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("Ctrl+C received; stopping after the current step");
            stop.store(true, Ordering::SeqCst);
        });
    }

    if !args.watch {
        return run_once(cfg, opts, Arc::clone(&stop), args.dry_run).await;
    }

    keep_going(run_once(cfg.clone(), opts.clone(), Arc::clone(&stop), args.dry_run).await)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _watcher = spawn_watcher(&watch_roots(&cfg), &ignored_dirs(&cfg), tx)?;

    while !stop.load(Ordering::SeqCst) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            batch = next_batch(&mut rx, DEBOUNCE) => {
                let Some(batch) = batch else { break };
                for path in batch.iter() {
                    debug!(path = ?relative_str(&cfg.paths.base_dir, path), "changed");
                }
                info!(changes = batch.len(), "change detected; re-running");
                keep_going(
                    run_once(cfg.clone(), opts.clone(), Arc::clone(&stop), args.dry_run).await,
                )?;
            }
        }
    }

    info!("watch mode stopped");
    Ok(())
}

/// One full pass: load the DAG, plan, and run (or print) the plan.
///
/// Runs on the blocking pool; the context owns a blocking HTTP client.
async fn run_once(
    cfg: ConfigFile,
    opts: RunOptions,
    stop: Arc<AtomicBool>,
    dry_run: bool,
) -> Result<()> {
    tokio::task::spawn_blocking(move || -> errors::Result<()> {
        let graph = load_dag(&cfg)?;
        let pipeline = Pipeline::new(Context::new(cfg)?);

        if dry_run {
            print_dry_run(&pipeline.plan(&graph, &opts)?);
            return Ok(());
        }

        let summary = pipeline.run(&graph, &opts, &stop)?;
        info!(
            planned = summary.planned.len(),
            executed = summary.executed.len(),
            interrupted = summary.interrupted,
            "run complete"
        );
        Ok(())
    })
    .await??;
    Ok(())
}

/// In watch mode a failed run is reported and the loop continues, unless the
/// failure must end the process.
fn keep_going(result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.downcast_ref::<EtlError>().is_some_and(EtlError::is_process_fatal) => Err(e),
        Err(e) => {
            error!("run failed: {e:#}");
            Ok(())
        }
    }
}

/// Print the ordered plan.
fn print_dry_run(steps: &[Step]) {
    println!("etl dry-run");
    if steps.is_empty() {
        println!("  (all steps up to date)");
        return;
    }
    println!("steps ({}):", steps.len());
    for step in steps {
        println!("  - {step}");
    }
    debug!("dry-run complete (no execution)");
}
