#![allow(dead_code)]

use std::sync::Arc;

pub use etldag_test_utils::builders;
pub use etldag_test_utils::fakes;
pub use etldag_test_utils::init_tracing;

use etldag::dag::{Graph, compile_steps};
use etldag::exec::{Transform, TransformRegistry};
use etldag::steps::Step;
use etldag_test_utils::RecordingTransform;

/// No include/exclude patterns.
pub const NONE: [&str; 0] = [];

/// Every step of `graph`, parsed and in dependency order.
pub fn all_steps(graph: &Graph) -> Vec<Step> {
    compile_steps(graph, &NONE, &NONE, false, false).expect("failed to compile steps")
}

/// Register the same recording transform for every step path.
pub fn registry_for(paths: &[&str], transform: &Arc<RecordingTransform>) -> TransformRegistry {
    let mut registry = TransformRegistry::new();
    for path in paths {
        registry.register(*path, Arc::clone(transform) as Arc<dyn Transform>);
    }
    registry
}
