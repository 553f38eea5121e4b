// src/dag/compile.rs

//! Turn a loaded graph plus user selection into a runnable, ordered list of
//! steps.

use tracing::debug;

use crate::dag::graph::{Graph, compile_patterns, filter_subgraph, matches_any, topological_order};
use crate::errors::Result;
use crate::steps::Step;
use crate::steps::factory::parse_step;

/// Step identifiers in an order where every step comes after its
/// dependencies.
///
/// Without `includes` the whole graph is ordered. Steps matching any of the
/// `excludes` patterns are dropped after ordering, so their dependents are
/// kept.
pub fn to_dependency_order<S: AsRef<str>>(
    graph: &Graph,
    includes: &[S],
    excludes: &[S],
    downstream: bool,
    only: bool,
) -> Result<Vec<String>> {
    let in_order = if includes.is_empty() {
        topological_order(graph)?
    } else {
        let subgraph = filter_subgraph(graph, includes, downstream, only)?;
        topological_order(&subgraph)?
    };

    let excludes = compile_patterns(excludes)?;
    let filtered: Vec<String> = in_order
        .into_iter()
        .filter(|s| !matches_any(s, &excludes))
        .collect();

    debug!(steps = filtered.len(), "resolved dependency order");
    Ok(filtered)
}

/// Ordered, parsed steps ready to be checked for staleness and run.
///
/// Each step's dependency subtree is built from the full graph, not the
/// filtered one.
pub fn compile_steps<S: AsRef<str>>(
    graph: &Graph,
    includes: &[S],
    excludes: &[S],
    downstream: bool,
    only: bool,
) -> Result<Vec<Step>> {
    to_dependency_order(graph, includes, excludes, downstream, only)?
        .iter()
        .map(|name| parse_step(name, graph))
        .collect()
}
