// src/publish/json.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use tracing::debug;

use super::{ColumnData, ColumnId, DatasetId, DatasetRecord, Datastore, DatastoreState};

/// File name of the store, relative to the data directory.
pub const STORE_FILE: &str = ".datastore.json";

/// [`Datastore`] persisted as one JSON document.
///
/// The whole state is loaded lazily on first use. Column upserts only touch
/// memory until [`Datastore::flush`]; every other mutation is written back
/// at once. Writes go through a temp file and a rename.
#[derive(Debug)]
pub struct JsonDatastore {
    path: PathBuf,
    state: Mutex<Option<Loaded>>,
}

#[derive(Debug)]
struct Loaded {
    state: DatastoreState,
    unsaved: bool,
}

/// When a mutation reaches the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    Never,
    Deferred,
    Now,
}

impl JsonDatastore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    /// Store located at `<data_dir>/.datastore.json`.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<Loaded>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self) -> Result<DatastoreState> {
        if !self.path.exists() {
            return Ok(DatastoreState::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading datastore {:?}", self.path))?;
        let state = serde_json::from_str(&contents)
            .with_context(|| format!("parsing datastore {:?}", self.path))?;
        debug!(path = ?self.path, "loaded datastore");
        Ok(state)
    }

    fn persist(&self, state: &DatastoreState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)
            .with_context(|| format!("writing datastore {tmp:?}"))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing datastore {:?}", self.path))?;
        Ok(())
    }

    /// Run `f` against the loaded state and write it back according to
    /// `persist`. An immediate write also saves deferred changes.
    fn with_state<T>(
        &self,
        persist: Persist,
        f: impl FnOnce(&mut DatastoreState) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.lock();
        if guard.is_none() {
            *guard = Some(Loaded {
                state: self.load()?,
                unsaved: false,
            });
        }
        let loaded = guard.as_mut().context("datastore state not loaded")?;
        let out = f(&mut loaded.state)?;
        match persist {
            Persist::Never => {}
            Persist::Deferred => loaded.unsaved = true,
            Persist::Now => {
                self.persist(&loaded.state)?;
                loaded.unsaved = false;
            }
        }
        Ok(out)
    }
}

impl Datastore for JsonDatastore {
    fn upsert_dataset(&self, dataset: &DatasetRecord) -> Result<DatasetId> {
        self.with_state(Persist::Now, |s| Ok(s.upsert_dataset(dataset)))
    }

    fn upsert_column(
        &self,
        dataset_id: DatasetId,
        catalog_path: &str,
        data: &ColumnData,
    ) -> Result<ColumnId> {
        self.with_state(Persist::Deferred, |s| s.upsert_column(dataset_id, catalog_path, data))
    }

    fn cleanup_ghost_columns(&self, dataset_id: DatasetId, keep: &[ColumnId]) -> Result<bool> {
        self.with_state(Persist::Now, |s| Ok(s.cleanup_ghost_columns(dataset_id, keep)))
    }

    fn fetch_checksum(&self, catalog_path: &str) -> Result<Option<String>> {
        self.with_state(Persist::Never, |s| Ok(s.fetch_checksum(catalog_path)))
    }

    fn set_checksum(&self, dataset_id: DatasetId, checksum: &str) -> Result<()> {
        self.with_state(Persist::Now, |s| s.set_checksum(dataset_id, checksum))
    }

    fn flush(&self) -> Result<()> {
        let mut guard = self.lock();
        if let Some(loaded) = guard.as_mut().filter(|l| l.unsaved) {
            self.persist(&loaded.state)?;
            loaded.unsaved = false;
            debug!(path = ?self.path, "flushed datastore");
        }
        Ok(())
    }
}
