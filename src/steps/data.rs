// src/steps/data.rs

//! Local transform step: builds a dataset under `<data_dir>/<path>`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSetBuilder};
use tracing::{debug, info, warn};

use crate::cache::DirtyCache;
use crate::catalog::{Dataset, DatasetIndex, download_if_current, index_mtime};
use crate::checksum::{checksum_file, checksum_parts};
use crate::config::ConfigFile;
use crate::context::Context;
use crate::errors::{EtlError, Result};
use crate::exec::{Recipe, resolve_recipe, run_isolated};
use crate::steps::hooks::PostRunHook;
use crate::steps::uri::{Scheme, split_segments};
use crate::steps::{Step, StepOps};

/// Key of the epoch marker in the input fingerprint.
pub const EPOCH_KEY: &str = "__etl_epoch__";
/// Key of the engine marker in the input fingerprint.
pub const ENGINE_KEY: &str = "__engine__";
/// Name and version of this engine; a new release rebuilds everything.
pub const ENGINE_MARKER: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Directories inside a step directory that never count as step files.
const IGNORED_DIRS: &[&str] = &["__pycache__", ".ipynb_checkpoints"];

#[derive(Debug, Clone)]
pub struct DataStep {
    path: String,
    scheme: Scheme,
    dependencies: Vec<Step>,
    post_run: Option<PostRunHook>,
}

impl DataStep {
    /// Public `data://` step. The path must be
    /// `channel/namespace/version/name`.
    pub fn new(path: impl Into<String>, dependencies: Vec<Step>) -> Result<Self> {
        Self::build(path.into(), Scheme::Data, dependencies, None)
    }

    /// `data-private://` step: same as [`new`](Self::new), but the dataset is
    /// marked private after every run.
    pub fn private(path: impl Into<String>, dependencies: Vec<Step>) -> Result<Self> {
        Self::build(
            path.into(),
            Scheme::DataPrivate,
            dependencies,
            Some(PostRunHook::MarkPrivate),
        )
    }

    fn build(
        path: String,
        scheme: Scheme,
        dependencies: Vec<Step>,
        post_run: Option<PostRunHook>,
    ) -> Result<Self> {
        let uri = format!("{scheme}://{path}");
        split_segments::<4>(&uri, &path).map_err(|e| EtlError::Construction {
            step: uri.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path,
            scheme,
            dependencies,
            post_run,
        })
    }

    pub fn post_run(&self) -> Option<PostRunHook> {
        self.post_run
    }

    /// `<data_dir>/<path>`.
    pub fn dest_dir(&self, cfg: &ConfigFile) -> PathBuf {
        cfg.paths.data_dir.join(self.path.trim_start_matches('/'))
    }

    pub fn has_existing_data(&self, cfg: &ConfigFile) -> bool {
        self.dest_dir(cfg).is_dir()
    }

    /// Where the step's code lives: `<steps_dir>/archive/<path>` when
    /// anything with that prefix exists, `<steps_dir>/data/<path>` otherwise.
    pub fn search_path(&self, cfg: &ConfigFile) -> PathBuf {
        let archive = cfg.paths.steps_dir.join("archive").join(&self.path);
        if has_prefixed_entry(&archive) {
            archive
        } else {
            cfg.paths.steps_dir.join("data").join(&self.path)
        }
    }

    /// Files defining this step, sorted.
    ///
    /// A directory contributes every file below it. A single-file step
    /// contributes `<name>.*` plus the `shared*` files next to it.
    pub fn step_files(&self, cfg: &ConfigFile) -> Result<Vec<PathBuf>> {
        let search_path = self.search_path(cfg);
        let mut files = Vec::new();

        if search_path.is_dir() {
            walk_step_dir(&search_path, &mut files)?;
        } else if let (Some(parent), Some(name)) = (search_path.parent(), search_path.file_name())
        {
            if parent.is_dir() {
                let name = name.to_string_lossy();
                let set = GlobSetBuilder::new()
                    .add(Glob::new(&format!("{name}.*"))?)
                    .add(Glob::new("shared*")?)
                    .build()?;

                let entries = fs::read_dir(parent).map_err(|e| EtlError::io(parent, e))?;
                for entry in entries {
                    let entry = entry.map_err(|e| EtlError::io(parent, e))?;
                    let path = entry.path();
                    if path.is_file() && set.is_match(entry.file_name()) {
                        files.push(path);
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Resolve and run the step's recipe in this process.
    ///
    /// This is what the child of an isolated run executes.
    pub fn execute_in_process(&self, ctx: &Context, dest_dir: &Path) -> Result<()> {
        let recipe = self.recipe(ctx)?;
        recipe
            .transform()
            .run(&self.uri(), dest_dir)
            .map_err(EtlError::Other)
    }

    fn recipe(&self, ctx: &Context) -> Result<Recipe> {
        let cfg = ctx.config();
        resolve_recipe(
            &self.path,
            &self.search_path(cfg),
            &ctx.transforms,
            &cfg.exec,
        )
        .ok_or_else(|| EtlError::NoRecipe(self.uri()))
    }

    /// Try to fetch a matching build from the remote catalog.
    fn download_from_catalog(&self, ctx: &Context, dest_dir: &Path) -> Result<bool> {
        let Some(catalog) = ctx.catalog.as_deref() else {
            return Ok(false);
        };
        let expected = self.checksum_output(ctx)?;
        match download_if_current(catalog, &self.path, &expected, dest_dir, ctx.config().run.workers) {
            Ok(downloaded) => Ok(downloaded),
            Err(e) => {
                debug!(step = %self.uri(), error = %e, "remote catalog unavailable, building locally");
                Ok(false)
            }
        }
    }
}

impl StepOps for DataStep {
    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn dependencies(&self) -> &[Step] {
        &self.dependencies
    }

    fn run(&self, ctx: &Context) -> Result<()> {
        let cfg = ctx.config();
        let dest_dir = self.dest_dir(cfg);
        let uri = self.uri();

        if let Some(parent) = dest_dir.parent() {
            fs::create_dir_all(parent).map_err(|e| EtlError::io(parent, e))?;
        }

        if cfg.run.prefer_download && self.download_from_catalog(ctx, &dest_dir)? {
            return Ok(());
        }

        let before = index_mtime(&dest_dir);

        let recipe = self.recipe(ctx)?;
        if recipe.runs_in_parent() || cfg.run.in_process {
            debug!(step = %uri, recipe = %recipe.describe(), "running in process");
            recipe
                .transform()
                .run(&uri, &dest_dir)
                .map_err(EtlError::Other)?;
        } else {
            run_isolated(&uri, &dest_dir, cfg)?;
        }

        let after = index_mtime(&dest_dir);
        if after.is_none() || after == before {
            warn!(step = %uri, "step did not save its output dataset");
        }

        fs::create_dir_all(&dest_dir).map_err(|e| EtlError::io(&dest_dir, e))?;
        Dataset::new(&dest_dir).finalize(&self.checksum_input(ctx)?)?;

        if let Some(hook) = self.post_run {
            hook.apply(&dest_dir)?;
        }

        info!(step = %uri, "dataset saved");
        Ok(())
    }

    fn is_dirty(&self, ctx: &Context, cache: &DirtyCache) -> Result<bool> {
        let cfg = ctx.config();
        if !self.has_existing_data(cfg) {
            return Ok(true);
        }

        for dep in self.dependencies.iter() {
            if dep.is_dirty(ctx, cache)? {
                return Ok(true);
            }
        }

        let found = match DatasetIndex::read(&self.dest_dir(cfg)) {
            Ok(index) => index.source_checksum,
            Err(e) => {
                debug!(step = %self.uri(), error = %e, "unreadable dataset index");
                return Ok(true);
            }
        };

        Ok(found.as_deref() != Some(self.checksum_input(ctx)?.as_str()))
    }

    fn checksum_input(&self, ctx: &Context) -> Result<String> {
        let cfg = ctx.config();
        let mut parts: BTreeMap<String, String> = BTreeMap::new();
        parts.insert(EPOCH_KEY.to_string(), cfg.run.epoch.clone());
        parts.insert(ENGINE_KEY.to_string(), ENGINE_MARKER.to_string());

        for dep in self.dependencies.iter() {
            parts.insert(dep.uri(), dep.checksum_output(ctx)?);
        }

        for file in self.step_files(cfg)? {
            let mut checksum = checksum_file(&file)?;

            if let Some(subset) = cfg.run.subset.as_deref() {
                let contents = fs::read(&file).map_err(|e| EtlError::io(&file, e))?;
                if contents.windows(b"SUBSET".len()).any(|w| w == b"SUBSET") {
                    checksum.push_str(subset);
                }
            }

            let key = file
                .strip_prefix(&cfg.paths.steps_dir)
                .unwrap_or(&file)
                .to_string_lossy()
                .into_owned();
            parts.insert(key, checksum);
        }

        Ok(checksum_parts(&parts))
    }
}

/// Whether anything in `path`'s parent directory has a name starting with
/// `path`'s file name.
fn has_prefixed_entry(path: &Path) -> bool {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return false;
    };
    let name = name.to_string_lossy();
    fs::read_dir(parent)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.file_name().to_string_lossy().starts_with(name.as_ref()))
        })
        .unwrap_or(false)
}

fn walk_step_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| EtlError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EtlError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name();
            if !IGNORED_DIRS.iter().any(|d| name == *d) {
                walk_step_dir(&path, out)?;
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}
