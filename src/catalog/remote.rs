// src/catalog/remote.rs

//! Remote cache of already-built datasets.
//!
//! When a published dataset was built from the same inputs as the local step
//! would use, downloading it is cheaper than running the transform. The
//! protocol is two plain GETs:
//!
//! - `<catalog_url>/<path>/index.json` for the metadata,
//! - `<storage_url>/<path>/<file>` for each file listed in the index.

use std::fs;
use std::path::{Component, Path};
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use rayon::prelude::*;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::catalog::dataset::DatasetIndex;
use crate::config::RemoteSection;
use crate::pool::bounded_pool;

/// Read access to a catalog of published datasets.
///
/// Implementations must be usable from several worker threads at once.
pub trait RemoteCatalog: Send + Sync {
    /// Fetch the index of the dataset at `path`. `Ok(None)` means the
    /// catalog does not have it.
    fn fetch_index(&self, path: &str) -> Result<Option<DatasetIndex>>;

    /// Download one file of the dataset at `path` to `dest`.
    fn download(&self, path: &str, file: &str, dest: &Path) -> Result<()>;
}

/// [`RemoteCatalog`] over HTTP(S), using reqwest's blocking client.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: Client,
    catalog_url: String,
    storage_url: String,
}

impl HttpCatalog {
    pub fn new(client: Client, remote: &RemoteSection) -> Self {
        Self {
            client,
            catalog_url: remote.catalog_url.trim_end_matches('/').to_string(),
            storage_url: remote.storage_url.trim_end_matches('/').to_string(),
        }
    }
}

impl RemoteCatalog for HttpCatalog {
    fn fetch_index(&self, path: &str) -> Result<Option<DatasetIndex>> {
        let url = format!("{}/{}/index.json", self.catalog_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("GET {url}"))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.json::<DatasetIndex>()?))
    }

    fn download(&self, path: &str, file: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/{}/{}", self.storage_url, path, file);
        let bytes = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .with_context(|| format!("GET {url}"))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, &bytes).with_context(|| format!("writing {dest:?}"))?;
        Ok(())
    }
}

/// Default HTTP client for catalog, snapshot and etag requests.
pub fn http_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(300))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Try to replace a local build of `path` with the published copy.
///
/// Returns `Ok(true)` when the remote index carries `expected_checksum` and
/// every listed file was downloaded into `dest_dir`. `Ok(false)` means the
/// catalog does not have a matching build; errors mean it could not be
/// reached or a download failed. Either way the caller builds locally.
pub fn download_if_current(
    catalog: &dyn RemoteCatalog,
    path: &str,
    expected_checksum: &str,
    dest_dir: &Path,
    workers: usize,
) -> Result<bool> {
    let Some(index) = catalog.fetch_index(path)? else {
        debug!(step = path, "dataset not found in remote catalog");
        return Ok(false);
    };

    if index.source_checksum.as_deref() != Some(expected_checksum) {
        debug!(
            step = path,
            remote = ?index.source_checksum,
            local = expected_checksum,
            "remote catalog checksum does not match"
        );
        return Ok(false);
    }

    if let Some(bad) = index.files.iter().find(|f| !is_plain_relative(f)) {
        bail!("remote index of {path} lists a file outside the dataset: {bad:?}");
    }

    fs::create_dir_all(dest_dir).with_context(|| format!("creating {dest_dir:?}"))?;

    let pool = bounded_pool(workers, "download")?;
    pool.install(|| {
        index
            .files
            .par_iter()
            .try_for_each(|file| catalog.download(path, file, &dest_dir.join(file)))
    })?;

    index.write(dest_dir)?;
    info!(step = path, files = index.files.len(), "downloaded dataset from catalog");
    Ok(true)
}

/// Only plain `a/b/c` names may be joined onto a dataset directory.
fn is_plain_relative(file: &str) -> bool {
    let path = Path::new(file);
    path.components().next().is_some()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}
