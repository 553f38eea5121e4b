// src/engine/pipeline.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cache::select_dirty_steps;
use crate::context::Context;
use crate::dag::{Graph, compile_steps};
use crate::errors::Result;
use crate::steps::{Step, StepOps};

use super::{RunOptions, RunSummary};

/// Sequential driver: compile, select, run.
#[derive(Debug)]
pub struct Pipeline {
    ctx: Context,
}

impl Pipeline {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Ordered list of steps that a run with `opts` would execute.
    pub fn plan(&self, graph: &Graph, opts: &RunOptions) -> Result<Vec<Step>> {
        let excludes = opts.effective_excludes();
        let steps = compile_steps(graph, &opts.includes, &excludes, opts.downstream, opts.only)?;
        debug!(candidates = steps.len(), force = opts.force, "compiled steps");

        if opts.force {
            return Ok(steps);
        }
        select_dirty_steps(steps, &self.ctx, self.ctx.config().run.workers)
    }

    /// Plan and run. `stop` is checked between steps; once set, no further
    /// step is started.
    pub fn run(&self, graph: &Graph, opts: &RunOptions, stop: &AtomicBool) -> Result<RunSummary> {
        let steps = self.plan(graph, opts)?;
        let mut summary = RunSummary {
            planned: steps.iter().map(|s| s.uri()).collect(),
            ..RunSummary::default()
        };

        if steps.is_empty() {
            info!("all steps up to date");
            return Ok(summary);
        }

        info!(steps = steps.len(), "running steps");
        for step in steps.iter() {
            if stop.load(Ordering::SeqCst) {
                warn!("stop requested; skipping remaining steps");
                summary.interrupted = true;
                break;
            }
            self.run_step(step)?;
            summary.executed.push(step.uri());
        }

        Ok(summary)
    }

    fn run_step(&self, step: &Step) -> Result<()> {
        let uri = step.uri();
        info!(step = %uri, "running step");
        let started = Instant::now();

        step.run(&self.ctx)?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(step = %uri, elapsed_ms, "step finished");
        Ok(())
    }
}
