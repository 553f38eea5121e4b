// tests/property/main.rs

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use etldag::dag::graph::{all_dependencies, all_usages};
use etldag::dag::{Graph, filter_subgraph, graph_nodes, reverse, topological_order};

// Acyclic by construction: step N may only depend on steps 0..N-1.
fn dag_strategy(max_steps: usize) -> impl Strategy<Value = Graph> {
    (1..=max_steps).prop_flat_map(|num_steps| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_steps),
            num_steps,
        )
        .prop_map(|raw_deps| {
            let mut graph: Graph = BTreeMap::new();
            for (i, potential) in raw_deps.into_iter().enumerate() {
                let deps: BTreeSet<String> = if i == 0 {
                    BTreeSet::new()
                } else {
                    potential.into_iter().map(|d| step_name(d % i)).collect()
                };
                graph.insert(step_name(i), deps);
            }
            graph
        })
    })
}

fn step_name(i: usize) -> String {
    format!("data://garden/ns/v/s{i:02}")
}

proptest! {
    #[test]
    fn topological_order_puts_dependencies_first(graph in dag_strategy(12)) {
        let order = topological_order(&graph).unwrap();
        prop_assert_eq!(order.len(), graph_nodes(&graph).len());

        let position: BTreeMap<&str, usize> =
            order.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();
        for (node, deps) in graph.iter() {
            for dep in deps {
                prop_assert!(position[dep.as_str()] < position[node.as_str()]);
            }
        }
    }

    #[test]
    fn reversing_twice_gives_back_the_graph(graph in dag_strategy(12)) {
        prop_assert_eq!(reverse(&reverse(&graph)), graph);
    }

    #[test]
    fn only_selects_exactly_the_matches(graph in dag_strategy(12), pick in 0usize..12) {
        let target = step_name(pick % graph.len());
        let pattern = format!("^{}$", regex::escape(&target));

        let sub = filter_subgraph(&graph, &[pattern], true, true).unwrap();
        let keys: Vec<&String> = sub.keys().collect();
        prop_assert_eq!(keys, vec![&target]);
        prop_assert!(sub[&target].is_empty());
    }

    #[test]
    fn default_selection_is_closed_under_dependencies(graph in dag_strategy(12), pick in 0usize..12) {
        let target = step_name(pick % graph.len());
        let pattern = format!("^{}$", regex::escape(&target));

        let sub = filter_subgraph(&graph, &[pattern], false, false).unwrap();
        let mut expected = all_dependencies(&graph, &target);
        expected.insert(target.clone());
        let keys: BTreeSet<String> = sub.keys().cloned().collect();
        prop_assert_eq!(keys, expected);
    }

    #[test]
    fn downstream_selection_covers_usages_and_their_dependencies(
        graph in dag_strategy(12),
        pick in 0usize..12,
    ) {
        let target = step_name(pick % graph.len());
        let pattern = format!("^{}$", regex::escape(&target));

        let sub = filter_subgraph(&graph, &[pattern], true, false).unwrap();
        for usage in all_usages(&graph, &target) {
            prop_assert!(sub.contains_key(&usage));
            for dep in all_dependencies(&graph, &usage) {
                prop_assert!(sub.contains_key(&dep));
            }
        }
    }
}
