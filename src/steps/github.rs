// src/steps/github.rs

//! Git mirror step (`github://org/repo`).
//!
//! Keeps a shallow clone at `<data_dir>/github/<org>/<repo>` and is dirty
//! whenever the remote HEAD moved.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::cache::DirtyCache;
use crate::context::Context;
use crate::errors::{EtlError, Result};
use crate::steps::StepOps;
use crate::steps::uri::{Scheme, split_segments};

/// A remote repository and its local clone.
#[derive(Debug, Clone)]
pub struct GitRepo {
    pub url: String,
    pub local: PathBuf,
}

impl GitRepo {
    /// Sha of the remote HEAD.
    pub fn remote_head(&self) -> Result<String> {
        let out = git(None, &["ls-remote", &self.url, "HEAD"])?;
        out.split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| EtlError::Git(format!("no HEAD reported by {}", self.url)))
    }

    /// Sha of the local clone's HEAD, if there is a clone.
    pub fn local_head(&self) -> Result<Option<String>> {
        if !self.local.join(".git").exists() {
            return Ok(None);
        }
        let out = git(Some(&self.local), &["rev-parse", "HEAD"])?;
        Ok(Some(out.trim().to_string()))
    }

    pub fn is_up_to_date(&self) -> Result<bool> {
        Ok(self.local_head()? == Some(self.remote_head()?))
    }

    /// Clone the repository, or pull if a clone already exists.
    pub fn ensure_cloned(&self) -> Result<()> {
        if self.local.join(".git").exists() {
            debug!(repo = %self.url, "pulling");
            git(Some(&self.local), &["pull", "--ff-only"])?;
            return Ok(());
        }

        if let Some(parent) = self.local.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EtlError::io(parent, e))?;
        }
        let local = self.local.to_string_lossy();
        info!(repo = %self.url, dest = %local, "cloning");
        git(None, &["clone", "--depth", "1", &self.url, &local])?;
        Ok(())
    }
}

fn git(cwd: Option<&Path>, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new("git");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd
        .args(args)
        .output()
        .map_err(|e| EtlError::Git(format!("failed to launch git: {e}")))?;

    if !output.status.success() {
        return Err(EtlError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Debug, Clone)]
pub struct GithubStep {
    path: String,
    org: String,
    repo: String,
}

impl GithubStep {
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let uri = format!("{}://{}", Scheme::Github, path);
        let [org, repo] = split_segments::<2>(&uri, &path).map_err(|_| EtlError::Construction {
            step: uri.clone(),
            reason: "github step is not in the form github://<org>/<repo>".to_string(),
        })?;
        Ok(Self { path, org, repo })
    }

    pub fn repo(&self, ctx: &Context) -> GitRepo {
        let cfg = ctx.config();
        GitRepo {
            url: format!(
                "{}/{}/{}.git",
                cfg.remote.github_url.trim_end_matches('/'),
                self.org,
                self.repo
            ),
            local: cfg.paths.data_dir.join("github").join(&self.org).join(&self.repo),
        }
    }
}

impl StepOps for GithubStep {
    fn scheme(&self) -> Scheme {
        Scheme::Github
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn run(&self, ctx: &Context) -> Result<()> {
        self.repo(ctx).ensure_cloned()
    }

    /// Always polls the remote.
    fn is_dirty(&self, ctx: &Context, _cache: &DirtyCache) -> Result<bool> {
        Ok(!self.repo(ctx).is_up_to_date()?)
    }

    fn checksum_input(&self, ctx: &Context) -> Result<String> {
        self.repo(ctx).remote_head()
    }
}
