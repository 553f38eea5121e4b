// src/dag/graph.rs

//! Pure graph algorithms over the step dependency graph.
//!
//! A [`Graph`] maps each step identifier to the set of identifiers it depends
//! on (edges point dependent -> dependency). Nothing here touches the
//! filesystem; every derivation returns a fresh graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::errors::{EtlError, Result};

/// Step identifier -> identifiers it depends on.
pub type Graph = BTreeMap<String, BTreeSet<String>>;

/// All nodes of the graph: keys plus every dependency target.
pub fn graph_nodes(graph: &Graph) -> BTreeSet<String> {
    let mut nodes: BTreeSet<String> = graph.keys().cloned().collect();
    for deps in graph.values() {
        nodes.extend(deps.iter().cloned());
    }
    nodes
}

/// Order the steps so that every dependency precedes its dependents.
///
/// The ordering among independent nodes is not unique. Nodes that only occur
/// as dependency targets are included too.
pub fn topological_order(graph: &Graph) -> Result<Vec<String>> {
    // Edge direction: dependency -> dependent, so toposort yields
    // dependencies first.
    let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();

    for (node, deps) in graph.iter() {
        g.add_node(node.as_str());
        for dep in deps {
            g.add_edge(dep.as_str(), node.as_str(), ());
        }
    }

    match toposort(&g, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(EtlError::Cycle(cycle.node_id().to_string())),
    }
}

/// Invert the edge direction of a graph.
///
/// Every node of the input shows up as a key, even when nothing depends on
/// it.
pub fn reverse(graph: &Graph) -> Graph {
    let mut reversed: Graph = BTreeMap::new();
    for (dest, sources) in graph.iter() {
        for source in sources {
            reversed
                .entry(source.clone())
                .or_default()
                .insert(dest.clone());
        }
        reversed.entry(dest.clone()).or_default();
    }
    reversed
}

/// Breadth-first traversal returning the sub-map of nodes reachable from
/// `from`, each mapped to its original edge set.
pub fn reachable<'a, I>(graph: &Graph, from: I) -> Graph
where
    I: IntoIterator<Item = &'a String>,
{
    let mut out: Graph = BTreeMap::new();
    let mut queue: VecDeque<String> = from.into_iter().cloned().collect();

    while let Some(node) = queue.pop_front() {
        if out.contains_key(&node) {
            continue;
        }
        let deps = graph.get(&node).cloned().unwrap_or_default();
        queue.extend(deps.iter().cloned());
        out.insert(node, deps);
    }

    out
}

/// Compile include/exclude patterns. Patterns are searched, not anchored.
pub fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p.as_ref()).map_err(EtlError::from))
        .collect()
}

/// Whether `step` matches any of the compiled patterns.
pub fn matches_any(step: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|re| re.is_match(step))
}

/// Filter the full graph down to the included nodes and their dependencies.
///
/// - default: matched nodes plus their upstream closure;
/// - `only`: exactly the matched nodes, keeping only edges between them;
/// - `downstream`: also every node that transitively depends on a matched
///   node, plus the upstream closure of that expanded set.
///
/// `only` takes precedence over `downstream`.
pub fn filter_subgraph<S: AsRef<str>>(
    graph: &Graph,
    includes: &[S],
    downstream: bool,
    only: bool,
) -> Result<Graph> {
    let patterns = compile_patterns(includes)?;
    let mut included: BTreeSet<String> = graph_nodes(graph)
        .into_iter()
        .filter(|s| matches_any(s, &patterns))
        .collect();

    if only {
        return Ok(included
            .iter()
            .map(|step| {
                let deps = graph
                    .get(step)
                    .map(|d| d.intersection(&included).cloned().collect())
                    .unwrap_or_default();
                (step.clone(), deps)
            })
            .collect());
    }

    if downstream {
        let forward = reachable(&reverse(graph), included.iter());
        included.extend(forward.into_keys());
    }

    Ok(reachable(graph, included.iter()))
}

/// Direct dependencies of a step.
pub fn direct_dependencies(graph: &Graph, step: &str) -> BTreeSet<String> {
    graph.get(step).cloned().unwrap_or_default()
}

/// Steps that list `step` as a direct dependency.
pub fn direct_usages(graph: &Graph, step: &str) -> BTreeSet<String> {
    graph
        .iter()
        .filter(|(_, deps)| deps.contains(step))
        .map(|(node, _)| node.clone())
        .collect()
}

/// Every transitive dependency of a step (the step itself excluded).
pub fn all_dependencies(graph: &Graph, step: &str) -> BTreeSet<String> {
    let start = step.to_string();
    let mut deps: BTreeSet<String> = reachable(graph, [&start]).into_keys().collect();
    deps.remove(step);
    deps
}

/// Every step that transitively depends on `step` (the step itself excluded).
pub fn all_usages(graph: &Graph, step: &str) -> BTreeSet<String> {
    let start = step.to_string();
    let mut usages: BTreeSet<String> = reachable(&reverse(graph), [&start]).into_keys().collect();
    usages.remove(step);
    usages
}
