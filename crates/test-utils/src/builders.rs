#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use etldag::config::{ConfigFile, RawConfigFile};
use etldag::context::Context;
use etldag::dag::{Graph, load_dag};
use etldag::exec::TransformRegistry;
use etldag::publish::{Datastore, MemoryDatastore};
use tempfile::TempDir;

/// Builder for `Graph` values: `edge(a, b)` means `a` depends on `b`.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a step with no dependencies (keeps existing ones).
    pub fn node(mut self, step: &str) -> Self {
        self.graph.entry(step.to_string()).or_default();
        self
    }

    pub fn edge(mut self, step: &str, dependency: &str) -> Self {
        self.graph
            .entry(step.to_string())
            .or_default()
            .insert(dependency.to_string());
        self
    }

    pub fn edges(mut self, step: &str, dependencies: &[&str]) -> Self {
        let deps: &mut BTreeSet<String> = self.graph.entry(step.to_string()).or_default();
        deps.extend(dependencies.iter().map(|d| d.to_string()));
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn base_dir(mut self, dir: &Path) -> Self {
        self.config.paths.base_dir = dir.to_path_buf();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.run.workers = n;
        self
    }

    pub fn publish_workers(mut self, n: usize) -> Self {
        self.config.run.publish_workers = n;
        self
    }

    pub fn in_process(mut self, val: bool) -> Self {
        self.config.run.in_process = val;
        self
    }

    pub fn prefer_download(mut self, val: bool) -> Self {
        self.config.run.prefer_download = val;
        self
    }

    pub fn epoch(mut self, epoch: &str) -> Self {
        self.config.run.epoch = epoch.to_string();
        self
    }

    pub fn subset(mut self, subset: &str) -> Self {
        self.config.run.subset = Some(subset.to_string());
        self
    }

    pub fn publish_filter(mut self, regex: &str) -> Self {
        self.config.run.publish_filter = Some(regex.to_string());
        self
    }

    pub fn max_virtual_memory(mut self, bytes: u64) -> Self {
        self.config.run.max_virtual_memory = Some(bytes);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scratch project on disk: DAG documents, step files and datasets under a
/// temp directory, with a matching config.
pub struct ProjectBuilder {
    config: ConfigFileBuilder,
    files: BTreeMap<PathBuf, String>,
}

impl ProjectBuilder {
    /// Transforms run in process by default.
    pub fn new() -> Self {
        Self {
            config: ConfigFileBuilder::new().in_process(true),
            files: BTreeMap::new(),
        }
    }

    pub fn config(mut self, f: impl FnOnce(ConfigFileBuilder) -> ConfigFileBuilder) -> Self {
        self.config = f(self.config);
        self
    }

    /// Root DAG document (`dag/main.yml`).
    pub fn dag(self, yaml: &str) -> Self {
        self.file("dag/main.yml", yaml)
    }

    /// Any file, relative to the project root.
    pub fn file(mut self, rel: &str, contents: &str) -> Self {
        self.files.insert(PathBuf::from(rel), contents.to_string());
        self
    }

    /// A single-file step script at `etl/steps/data/<path>.py`.
    pub fn step_script(self, path: &str, contents: &str) -> Self {
        self.file(&format!("etl/steps/data/{path}.py"), contents)
    }

    pub fn build(self) -> Project {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        for (rel, contents) in self.files.iter() {
            write_file(&dir.path().join(rel), contents);
        }
        let config = self.config.base_dir(dir.path()).build();
        Project { dir, config }
    }
}

impl Default for ProjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A built scratch project. The directory is removed on drop.
pub struct Project {
    pub dir: TempDir,
    pub config: ConfigFile,
}

impl Project {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        write_file(&self.path(rel), contents);
    }

    pub fn graph(&self) -> Graph {
        load_dag(&self.config).expect("failed to load DAG")
    }

    /// Context with an in-memory datastore and no remote catalog.
    pub fn context(&self) -> Context {
        self.context_with(TransformRegistry::new(), Arc::new(MemoryDatastore::new()))
    }

    pub fn context_with(
        &self,
        transforms: TransformRegistry,
        datastore: Arc<dyn Datastore>,
    ) -> Context {
        Context::new(self.config.clone())
            .expect("failed to build context")
            .with_catalog(None)
            .with_datastore(datastore)
            .with_transforms(transforms)
    }
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create parent dir");
    }
    fs::write(path, contents).expect("failed to write file");
}
