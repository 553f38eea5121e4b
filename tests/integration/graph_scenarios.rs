use std::collections::BTreeSet;

use etldag::dag::graph::{all_dependencies, all_usages, direct_dependencies, direct_usages};
use etldag::dag::{filter_subgraph, reachable, reverse, to_dependency_order, topological_order};
use etldag::errors::EtlError;
use etldag_test_utils::GraphBuilder;

use crate::common::NONE;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// meadow -> garden -> grapher, plus an unrelated `other` branch.
fn energy_graph() -> etldag::dag::Graph {
    GraphBuilder::new()
        .edge("data://meadow/energy/v/e", "snapshot://energy/v/e.csv")
        .edge("data://garden/energy/v/e", "data://meadow/energy/v/e")
        .edge("grapher://garden/energy/v/e", "data://garden/energy/v/e")
        .edge("data://garden/other/v/o", "snapshot://other/v/o.csv")
        .build()
}

#[test]
fn two_node_graph_has_a_single_order() {
    let graph = GraphBuilder::new().node("a://x").edge("b://y", "a://x").build();
    assert_eq!(topological_order(&graph).unwrap(), vec!["a://x", "b://y"]);
}

#[test]
fn dependency_only_nodes_are_ordered_too() {
    let graph = GraphBuilder::new().edge("b://y", "a://x").build();
    assert_eq!(topological_order(&graph).unwrap(), vec!["a://x", "b://y"]);
}

#[test]
fn cycle_is_reported_with_a_step_name() {
    let graph = GraphBuilder::new()
        .edge("a://x", "b://y")
        .edge("b://y", "a://x")
        .build();
    match topological_order(&graph) {
        Err(EtlError::Cycle(step)) => assert!(step == "a://x" || step == "b://y"),
        other => panic!("expected cycle error, got {other:?}"),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let graph = GraphBuilder::new().edge("a://x", "a://x").build();
    assert!(matches!(topological_order(&graph), Err(EtlError::Cycle(_))));
}

#[test]
fn reverse_lists_every_node() {
    let graph = GraphBuilder::new().edge("b://y", "a://x").build();
    let reversed = reverse(&graph);
    assert_eq!(reversed["a://x"], set(&["b://y"]));
    assert!(reversed["b://y"].is_empty());
}

#[test]
fn reachable_keeps_original_edges() {
    let graph = energy_graph();
    let start = "data://garden/energy/v/e".to_string();
    let sub = reachable(&graph, [&start]);
    assert_eq!(
        sub.keys().cloned().collect::<BTreeSet<_>>(),
        set(&[
            "data://garden/energy/v/e",
            "data://meadow/energy/v/e",
            "snapshot://energy/v/e.csv",
        ])
    );
    assert_eq!(sub["data://meadow/energy/v/e"], set(&["snapshot://energy/v/e.csv"]));
}

#[test]
fn include_pulls_in_dependencies() {
    let sub = filter_subgraph(&energy_graph(), &["garden/energy"], false, false).unwrap();
    assert!(sub.contains_key("snapshot://energy/v/e.csv"));
    assert!(sub.contains_key("grapher://garden/energy/v/e"));
    assert!(!sub.contains_key("data://garden/other/v/o"));
}

#[test]
fn downstream_adds_dependents() {
    let sub = filter_subgraph(&energy_graph(), &["meadow/energy"], true, false).unwrap();
    assert!(sub.contains_key("data://garden/energy/v/e"));
    assert!(sub.contains_key("grapher://garden/energy/v/e"));
    assert!(!sub.contains_key("data://garden/other/v/o"));
}

#[test]
fn only_wins_over_downstream() {
    let sub = filter_subgraph(&energy_graph(), &["^data://meadow/energy"], true, true).unwrap();
    assert_eq!(sub.len(), 1);
    assert!(sub["data://meadow/energy/v/e"].is_empty());
}

#[test]
fn excluded_steps_do_not_drop_their_dependents() {
    let order = to_dependency_order(
        &energy_graph(),
        &["garden/energy"],
        &["^snapshot://"],
        false,
        false,
    )
    .unwrap();
    assert_eq!(
        order,
        vec![
            "data://meadow/energy/v/e",
            "data://garden/energy/v/e",
            "grapher://garden/energy/v/e",
        ]
    );
}

#[test]
fn no_includes_orders_the_whole_graph() {
    let order = to_dependency_order(&energy_graph(), &NONE, &NONE, false, false).unwrap();
    assert_eq!(order.len(), 6);
}

#[test]
fn invalid_pattern_is_an_error() {
    let result = filter_subgraph(&energy_graph(), &["("], false, false);
    assert!(matches!(result, Err(EtlError::Pattern(_))));
}

#[test]
fn neighbourhood_queries() {
    let graph = energy_graph();
    assert_eq!(
        direct_dependencies(&graph, "data://garden/energy/v/e"),
        set(&["data://meadow/energy/v/e"])
    );
    assert_eq!(
        direct_usages(&graph, "data://garden/energy/v/e"),
        set(&["grapher://garden/energy/v/e"])
    );
    assert_eq!(
        all_dependencies(&graph, "grapher://garden/energy/v/e"),
        set(&[
            "data://garden/energy/v/e",
            "data://meadow/energy/v/e",
            "snapshot://energy/v/e.csv",
        ])
    );
    assert_eq!(
        all_usages(&graph, "snapshot://energy/v/e.csv"),
        set(&[
            "data://meadow/energy/v/e",
            "data://garden/energy/v/e",
            "grapher://garden/energy/v/e",
        ])
    );
}
