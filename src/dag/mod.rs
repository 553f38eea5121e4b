// src/dag/mod.rs

//! Step dependency graph.
//!
//! - [`graph`] holds the pure graph algorithms (ordering, filtering,
//!   reachability).
//! - [`loader`] reads the YAML DAG documents, following `include`s.
//! - [`compile`] combines both with the step factory into an ordered list of
//!   runnable steps.

pub mod compile;
pub mod graph;
pub mod loader;

pub use compile::{compile_steps, to_dependency_order};
pub use graph::{Graph, filter_subgraph, graph_nodes, reachable, reverse, topological_order};
pub use loader::{DagLoader, RestrictedPolicy, load_dag};
