// src/exec/transform.rs

//! The pluggable unit of work behind a data step.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

/// Logic that produces one dataset.
///
/// `dest_dir` is the dataset directory the transform must populate,
/// including its `index.json`. The directory's parent exists; the directory
/// itself may not.
pub trait Transform: Send + Sync {
    fn run(&self, step: &str, dest_dir: &Path) -> Result<()>;

    /// Short label for logs.
    fn describe(&self) -> String {
        "transform".to_string()
    }
}

/// Adapter so plain closures can be registered as transforms.
pub struct FnTransform<F>(pub F);

impl<F> Transform for FnTransform<F>
where
    F: Fn(&str, &Path) -> Result<()> + Send + Sync,
{
    fn run(&self, step: &str, dest_dir: &Path) -> Result<()> {
        (self.0)(step, dest_dir)
    }

    fn describe(&self) -> String {
        "closure".to_string()
    }
}

/// Transforms compiled into the current binary, keyed by step path
/// (`channel/namespace/version/name`).
///
/// A `data://` and a `data-private://` step with the same path share the
/// registered transform.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<String>, transform: Arc<dyn Transform>) {
        self.transforms.insert(path.into(), transform);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, path: impl Into<String>, transform: Arc<dyn Transform>) -> Self {
        self.register(path, transform);
        self
    }

    pub fn get(&self, path: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.transforms.keys().collect();
        keys.sort();
        f.debug_struct("TransformRegistry")
            .field("steps", &keys)
            .finish()
    }
}
