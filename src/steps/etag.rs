// src/steps/etag.rs

use reqwest::header::ETAG;

use crate::cache::DirtyCache;
use crate::context::Context;
use crate::errors::{EtlError, Result};
use crate::steps::StepOps;
use crate::steps::uri::Scheme;

/// Dependency on the `ETag` of `https://<path>`.
///
/// Never dirty and does nothing when run; dependents rebuild when the ETag
/// changes because it is part of their input fingerprint.
#[derive(Debug, Clone)]
pub struct ETagStep {
    path: String,
}

impl ETagStep {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn url(&self) -> String {
        format!("https://{}", self.path)
    }
}

impl StepOps for ETagStep {
    fn scheme(&self) -> Scheme {
        Scheme::ETag
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn run(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    fn is_dirty(&self, _ctx: &Context, _cache: &DirtyCache) -> Result<bool> {
        Ok(false)
    }

    fn checksum_input(&self, ctx: &Context) -> Result<String> {
        let url = self.url();
        let resp = ctx.http.head(&url).send()?.error_for_status()?;
        resp.headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| EtlError::Other(anyhow::anyhow!("no ETag header at {url}")))
    }
}
