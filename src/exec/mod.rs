// src/exec/mod.rs

//! Execution layer for data steps.
//!
//! - [`transform`] defines the [`Transform`] trait and the registry of
//!   transforms compiled into the binary.
//! - [`script`] holds the file-backed transforms (interpreter scripts and
//!   notebooks) and the process-wide notebook lock.
//! - [`recipe`] decides which transform implements a given step.
//! - [`isolated`] re-executes the current binary to run one step in a child
//!   process.

pub mod isolated;
pub mod recipe;
pub mod script;
pub mod transform;

pub use isolated::{RUN_STEP_COMMAND, isolated_args, run_isolated};
pub use recipe::{Recipe, resolve_recipe};
pub use script::{NOTEBOOK_LOCK, NotebookTransform, ScriptTransform, notebook_guard};
pub use transform::{FnTransform, Transform, TransformRegistry};
