// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration as read from `etl.toml`.
///
/// ```toml
/// [paths]
/// dag_file = "dag/main.yml"
/// steps_dir = "etl/steps"
/// data_dir = "data"
///
/// [run]
/// workers = 4
/// prefer_download = true
///
/// [remote]
/// catalog_url = "https://catalog.example.org"
///
/// [exec.interpreters]
/// py = "python3"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub remote: RemoteSection,

    #[serde(default)]
    pub dag: DagSection,

    #[serde(default)]
    pub exec: ExecSection,
}

/// Validated configuration, with every path made absolute against
/// `paths.base_dir`.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)` or the
/// loader, so code holding one can rely on the invariants checked in
/// `config::validate`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub paths: PathsSection,
    pub run: RunSection,
    pub remote: RemoteSection,
    pub dag: DagSection,
    pub exec: ExecSection,

    /// File this config was read from, if any. Handed to isolated child
    /// processes so that they resolve the same project.
    pub source: Option<PathBuf>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        let paths = raw.paths.resolved();
        Self {
            paths,
            run: raw.run,
            remote: raw.remote,
            dag: raw.dag,
            exec: raw.exec,
            source: None,
        }
    }

    /// Directory containing the root DAG document.
    pub fn dag_dir(&self) -> &Path {
        self.paths
            .dag_file
            .parent()
            .unwrap_or(self.paths.base_dir.as_path())
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Project root. Relative paths below are resolved against it.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Root DAG document.
    #[serde(default = "default_dag_file")]
    pub dag_file: PathBuf,

    /// Directory holding step definitions (`data/` and `archive/` below it).
    #[serde(default = "default_steps_dir")]
    pub steps_dir: PathBuf,

    /// Where datasets are written.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Snapshot metadata (`.dvc`) files.
    #[serde(default = "default_snapshots_dir")]
    pub snapshots_dir: PathBuf,

    /// Archive catalog (`index/`) and its local download cache (`cache/`).
    #[serde(default = "default_walden_dir")]
    pub walden_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_dag_file() -> PathBuf {
    PathBuf::from("dag/main.yml")
}

fn default_steps_dir() -> PathBuf {
    PathBuf::from("etl/steps")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_snapshots_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

fn default_walden_dir() -> PathBuf {
    PathBuf::from("walden")
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            dag_file: default_dag_file(),
            steps_dir: default_steps_dir(),
            data_dir: default_data_dir(),
            snapshots_dir: default_snapshots_dir(),
            walden_dir: default_walden_dir(),
        }
    }
}

impl PathsSection {
    fn resolved(self) -> Self {
        let base = self.base_dir.clone();
        let join = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        Self {
            dag_file: join(self.dag_file),
            steps_dir: join(self.steps_dir),
            data_dir: join(self.data_dir),
            snapshots_dir: join(self.snapshots_dir),
            walden_dir: join(self.walden_dir),
            base_dir: self.base_dir,
        }
    }
}

/// `[run]` section: knobs for staleness checks and execution.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    /// Worker threads for batch staleness checks and catalog downloads.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Worker threads for per-column publication upserts.
    #[serde(default = "default_publish_workers")]
    pub publish_workers: usize,

    /// Try the remote catalog before running a data step locally.
    #[serde(default)]
    pub prefer_download: bool,

    /// Call transforms in this process instead of an isolated child process.
    #[serde(default)]
    pub in_process: bool,

    /// Virtual memory cap (bytes) for isolated child processes on Linux.
    #[serde(default)]
    pub max_virtual_memory: Option<u64>,

    /// Bumping the epoch invalidates every data step fingerprint.
    #[serde(default = "default_epoch")]
    pub epoch: String,

    /// Process only a subset of the data; part of the fingerprint of files
    /// that reference `SUBSET`.
    #[serde(default)]
    pub subset: Option<String>,

    /// Only publish columns matching this regex.
    #[serde(default)]
    pub publish_filter: Option<String>,
}

fn default_workers() -> usize {
    1
}

fn default_publish_workers() -> usize {
    10
}

fn default_epoch() -> String {
    "1".to_string()
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            publish_workers: default_publish_workers(),
            prefer_download: false,
            in_process: false,
            max_virtual_memory: None,
            epoch: default_epoch(),
            subset: None,
            publish_filter: None,
        }
    }
}

/// `[remote]` section: endpoints of external collaborators.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    /// Base URL serving `<path>/index.json` for published datasets.
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,

    /// Base URL of the object storage holding dataset files.
    #[serde(default = "default_storage_url")]
    pub storage_url: String,

    /// Content-addressed store for snapshot files.
    #[serde(default = "default_snapshot_url")]
    pub snapshot_url: String,

    /// Git host for `github://org/repo` steps.
    #[serde(default = "default_github_url")]
    pub github_url: String,
}

fn default_catalog_url() -> String {
    "https://catalog.ourworldindata.org".to_string()
}

fn default_storage_url() -> String {
    "https://catalog.ourworldindata.org".to_string()
}

fn default_snapshot_url() -> String {
    "https://snapshots.owid.io".to_string()
}

fn default_github_url() -> String {
    "https://github.com".to_string()
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            catalog_url: default_catalog_url(),
            storage_url: default_storage_url(),
            snapshot_url: default_snapshot_url(),
            github_url: default_github_url(),
        }
    }
}

/// `[dag]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DagSection {
    /// Steps containing this marker may only be declared in
    /// `restricted_document`.
    #[serde(default = "default_restricted_marker")]
    pub restricted_marker: String,

    /// File name of the only document allowed to declare restricted steps.
    #[serde(default = "default_restricted_document")]
    pub restricted_document: String,
}

fn default_restricted_marker() -> String {
    "/fasttrack/".to_string()
}

fn default_restricted_document() -> String {
    "fasttrack.yml".to_string()
}

impl Default for DagSection {
    fn default() -> Self {
        Self {
            restricted_marker: default_restricted_marker(),
            restricted_document: default_restricted_document(),
        }
    }
}

/// `[exec]` section: how step scripts and notebooks are launched.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecSection {
    /// File extension -> interpreter command, e.g. `py = "python3"`.
    #[serde(default = "default_interpreters")]
    pub interpreters: BTreeMap<String, String>,

    /// Command used to execute `.ipynb` steps. The notebook path and the
    /// destination directory are appended as `<notebook> <output> -p dest_dir <dir>`.
    #[serde(default = "default_notebook_command")]
    pub notebook_command: Vec<String>,
}

fn default_interpreters() -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert("py".to_string(), "python3".to_string());
    m.insert("sh".to_string(), "sh".to_string());
    m
}

fn default_notebook_command() -> Vec<String> {
    vec!["papermill".to_string()]
}

impl Default for ExecSection {
    fn default() -> Self {
        Self {
            interpreters: default_interpreters(),
            notebook_command: default_notebook_command(),
        }
    }
}
