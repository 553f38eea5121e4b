// src/steps/archive.rs

//! Remote archive step (`walden://namespace/version/short_name`).
//!
//! Entries of the immutable archive catalog live at
//! `<walden_dir>/index/<namespace>/<version>/<short_name>.json`; downloaded
//! files are cached under `<walden_dir>/cache/`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::DirtyCache;
use crate::checksum::{checksum_file, checksum_str};
use crate::config::ConfigFile;
use crate::context::Context;
use crate::errors::{EtlError, Result};
use crate::steps::StepOps;
use crate::steps::uri::{Scheme, split_segments};

/// Version alias resolved to the newest version in the catalog.
pub const LATEST: &str = "latest";

/// One entry of the archive catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveEntry {
    pub namespace: String,
    pub short_name: String,
    pub version: String,

    /// Hex blake3 of the archived file.
    #[serde(default)]
    pub checksum: Option<String>,

    /// Where the file can be downloaded from.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub file_extension: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ArchiveStep {
    path: String,
    scheme: Scheme,
    namespace: String,
    version: String,
    short_name: String,
}

impl ArchiveStep {
    /// `walden://` or `walden-private://` step; the path must have exactly
    /// three segments.
    pub fn new(path: impl Into<String>, scheme: Scheme) -> Result<Self> {
        let path = path.into();
        let uri = format!("{scheme}://{path}");
        let [namespace, version, short_name] =
            split_segments::<3>(&uri, &path).map_err(|e| EtlError::Construction {
                step: uri.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            path,
            scheme,
            namespace,
            version,
            short_name,
        })
    }

    /// Catalog file describing this step's entry, with `latest` resolved.
    pub fn index_path(&self, cfg: &ConfigFile) -> Result<PathBuf> {
        let ns_dir = cfg.paths.walden_dir.join("index").join(&self.namespace);
        let file_name = format!("{}.json", self.short_name);

        if self.version != LATEST {
            return Ok(ns_dir.join(&self.version).join(file_name));
        }

        let entries = fs::read_dir(&ns_dir).map_err(|e| EtlError::io(&ns_dir, e))?;
        let newest = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.join(&file_name).is_file())
            .max();

        match newest {
            Some(dir) => Ok(dir.join(file_name)),
            None => Err(EtlError::Other(anyhow::anyhow!(
                "no version of {}/{} in archive catalog {:?}",
                self.namespace,
                self.short_name,
                ns_dir
            ))),
        }
    }

    pub fn entry(&self, cfg: &ConfigFile) -> Result<ArchiveEntry> {
        let path = self.index_path(cfg)?;
        let contents = fs::read_to_string(&path).map_err(|e| EtlError::io(&path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Local copy of the archived file.
    pub fn local_path(&self, cfg: &ConfigFile, entry: &ArchiveEntry) -> PathBuf {
        let file_name = match entry.file_extension.as_deref() {
            Some(ext) if !ext.is_empty() => format!("{}.{}", entry.short_name, ext),
            _ => entry.short_name.clone(),
        };
        cfg.paths
            .walden_dir
            .join("cache")
            .join(&entry.namespace)
            .join(&entry.version)
            .join(file_name)
    }

    fn required_checksum<'a>(&self, entry: &'a ArchiveEntry) -> Result<&'a str> {
        entry.checksum.as_deref().ok_or_else(|| {
            EtlError::Other(anyhow::anyhow!(
                "archive entry is missing checksum: {}",
                self.uri()
            ))
        })
    }

    fn is_downloaded(local: &Path, expected: &str) -> Result<bool> {
        Ok(local.is_file() && checksum_file(local)? == expected)
    }
}

impl StepOps for ArchiveStep {
    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn path(&self) -> &str {
        &self.path
    }

    /// Download the archived file unless a verified copy is already cached.
    fn run(&self, ctx: &Context) -> Result<()> {
        let cfg = ctx.config();
        let entry = self.entry(cfg)?;
        let expected = self.required_checksum(&entry)?;
        let local = self.local_path(cfg, &entry);

        if Self::is_downloaded(&local, expected)? {
            debug!(step = %self.uri(), "archive file already cached");
            return Ok(());
        }

        let url = entry.url.as_deref().ok_or_else(|| {
            EtlError::Other(anyhow::anyhow!("archive entry has no url: {}", self.uri()))
        })?;

        let bytes = ctx
            .http
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())?;

        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).map_err(|e| EtlError::io(parent, e))?;
        }
        fs::write(&local, &bytes).map_err(|e| EtlError::io(&local, e))?;

        let actual = checksum_file(&local)?;
        if actual != expected {
            let _ = fs::remove_file(&local);
            return Err(EtlError::Checksum {
                what: self.uri(),
                expected: expected.to_string(),
                actual,
            });
        }

        info!(step = %self.uri(), url, "downloaded archive file");
        Ok(())
    }

    fn is_dirty(&self, ctx: &Context, _cache: &DirtyCache) -> Result<bool> {
        let cfg = ctx.config();
        let entry = self.entry(cfg)?;
        let local = self.local_path(cfg, &entry);
        match entry.checksum.as_deref() {
            Some(expected) => Ok(!Self::is_downloaded(&local, expected)?),
            None => Ok(true),
        }
    }

    /// Entry checksum combined with the checksum of the catalog file itself.
    fn checksum_input(&self, ctx: &Context) -> Result<String> {
        let cfg = ctx.config();
        let entry = self.entry(cfg)?;
        let content = self.required_checksum(&entry)?;
        let metadata = checksum_file(&self.index_path(cfg)?)?;
        Ok(checksum_str(&format!("{content},{metadata}")))
    }
}
