// src/steps/snapshot.rs

//! Ingestion snapshot step (`snapshot://namespace/version/file_name`).
//!
//! A snapshot is described by a YAML metadata file
//! `<snapshots_dir>/<namespace>/<version>/<file_name>.dvc`:
//!
//! ```yaml
//! meta:
//!   is_public: true
//!   source_name: Energy Institute
//! outs:
//!   - checksum: 3b1f...
//!     size: 10240
//!     path: primary_energy.csv
//! ```
//!
//! The data itself is content-addressed in the snapshot store and pulled to
//! `<data_dir>/snapshots/<path>`.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::cache::DirtyCache;
use crate::checksum::checksum_file;
use crate::config::ConfigFile;
use crate::context::Context;
use crate::errors::{EtlError, Result};
use crate::steps::StepOps;
use crate::steps::uri::{Scheme, split_segments};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotMeta {
    #[serde(default = "default_true")]
    pub is_public: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for SnapshotMeta {
    fn default() -> Self {
        Self {
            is_public: true,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotOut {
    /// Hex blake3 of the data file.
    pub checksum: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Parsed `.dvc` metadata file.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub meta: SnapshotMeta,
    #[serde(default)]
    pub outs: Vec<SnapshotOut>,
}

impl SnapshotFile {
    pub fn checksum(&self) -> Option<&str> {
        self.outs.first().map(|o| o.checksum.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStep {
    path: String,
    scheme: Scheme,
}

impl SnapshotStep {
    /// `snapshot://` or `snapshot-private://` step; the path must have
    /// exactly three segments.
    pub fn new(path: impl Into<String>, scheme: Scheme) -> Result<Self> {
        let path = path.into();
        let uri = format!("{scheme}://{path}");
        split_segments::<3>(&uri, &path).map_err(|e| EtlError::Construction {
            step: uri.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { path, scheme })
    }

    pub fn dvc_path(&self, cfg: &ConfigFile) -> PathBuf {
        cfg.paths.snapshots_dir.join(format!("{}.dvc", self.path))
    }

    /// Local copy of the snapshot data.
    pub fn data_path(&self, cfg: &ConfigFile) -> PathBuf {
        cfg.paths.data_dir.join("snapshots").join(&self.path)
    }

    pub fn metadata(&self, cfg: &ConfigFile) -> Result<SnapshotFile> {
        let path = self.dvc_path(cfg);
        let contents = fs::read_to_string(&path).map_err(|e| EtlError::io(&path, e))?;
        serde_yaml::from_str(&contents).map_err(|e| EtlError::Yaml { path, source: e })
    }

    fn unusable_checksum(&self) -> EtlError {
        EtlError::Other(anyhow::anyhow!(
            "snapshot metadata has no usable checksum: {}",
            self.uri()
        ))
    }

    /// Download the data file from the content-addressed store and verify it.
    fn pull(&self, ctx: &Context, file: &SnapshotFile) -> Result<()> {
        let cfg = ctx.config();
        let checksum = file.checksum().ok_or_else(|| self.unusable_checksum())?;
        let (prefix, rest) = store_key(checksum).ok_or_else(|| self.unusable_checksum())?;
        let url = format!(
            "{}/{prefix}/{rest}",
            cfg.remote.snapshot_url.trim_end_matches('/'),
        );

        let bytes = ctx
            .http
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())?;

        let dest = self.data_path(cfg);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| EtlError::io(parent, e))?;
        }
        fs::write(&dest, &bytes).map_err(|e| EtlError::io(&dest, e))?;

        let actual = checksum_file(&dest)?;
        if actual != checksum {
            let _ = fs::remove_file(&dest);
            return Err(EtlError::Checksum {
                what: self.uri(),
                expected: checksum.to_string(),
                actual,
            });
        }

        info!(step = %self.uri(), url = %url, "pulled snapshot");
        Ok(())
    }
}

/// `<checksum[..2]>` and `<checksum[2..]>` in the content-addressed store.
fn store_key(checksum: &str) -> Option<(&str, &str)> {
    let prefix = checksum.get(..2)?;
    let rest = checksum.get(2..).filter(|r| !r.is_empty())?;
    Some((prefix, rest))
}

impl StepOps for SnapshotStep {
    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn run(&self, ctx: &Context) -> Result<()> {
        let file = self.metadata(ctx.config())?;
        if self.scheme.is_private() && file.meta.is_public {
            return Err(EtlError::Other(anyhow::anyhow!(
                "private snapshot {} is marked as public in its metadata",
                self.uri()
            )));
        }
        self.pull(ctx, &file)
    }

    fn is_dirty(&self, ctx: &Context, _cache: &DirtyCache) -> Result<bool> {
        let cfg = ctx.config();
        let file = self.metadata(cfg)?;
        let data = self.data_path(cfg);
        if !data.is_file() {
            return Ok(true);
        }
        Ok(file.checksum() != Some(checksum_file(&data)?.as_str()))
    }

    /// Checksum of the `.dvc` metadata file.
    fn checksum_input(&self, ctx: &Context) -> Result<String> {
        checksum_file(&self.dvc_path(ctx.config()))
    }
}
