// src/publish/mod.rs

//! Publication backends.
//!
//! The publication step talks to a [`Datastore`] instead of a concrete
//! database. Two implementations ship with etldag:
//!
//! - [`MemoryDatastore`] keeps everything in memory (tests, dry runs).
//! - [`JsonDatastore`] persists to a single JSON file under the data
//!   directory.

mod json;
mod memory;

pub use json::JsonDatastore;
pub use memory::MemoryDatastore;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recorded instead of a real checksum when a publication could not clean
/// up after itself, so that the next run publishes again.
pub const RERUN_SENTINEL: &str = "to_be_rerun";

pub type DatasetId = u64;
pub type ColumnId = u64;

/// Dataset-level metadata pushed before any column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Step path (`channel/namespace/version/name`).
    pub catalog_path: String,
    pub namespace: String,
    pub version: String,
    pub short_name: String,
    pub is_public: bool,
}

/// One published column: index values plus the column's values, with rows
/// holding nulls already dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnData {
    pub index: Vec<String>,
    pub rows: Vec<(Vec<Value>, Value)>,
}

/// Target of the publication step.
///
/// Column upserts are issued concurrently from a worker pool, so
/// implementations must be thread-safe.
pub trait Datastore: Send + Sync {
    /// Create or update a dataset, returning its id. Upserting the same
    /// `catalog_path` twice returns the same id.
    fn upsert_dataset(&self, dataset: &DatasetRecord) -> Result<DatasetId>;

    /// Create or update a single column, keyed by its catalog path
    /// (`<path>/<table>#<column>`).
    fn upsert_column(
        &self,
        dataset_id: DatasetId,
        catalog_path: &str,
        data: &ColumnData,
    ) -> Result<ColumnId>;

    /// Remove the dataset's columns that were not part of `keep`.
    ///
    /// `Ok(false)` means some columns could not be removed yet.
    fn cleanup_ghost_columns(&self, dataset_id: DatasetId, keep: &[ColumnId]) -> Result<bool>;

    /// Checksum recorded for the dataset at `catalog_path`, if any.
    fn fetch_checksum(&self, catalog_path: &str) -> Result<Option<String>>;

    fn set_checksum(&self, dataset_id: DatasetId, checksum: &str) -> Result<()>;

    /// Make buffered column upserts durable. Called once per publication,
    /// after all columns were submitted.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Serializable state shared by the bundled implementations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatastoreState {
    pub next_id: u64,
    pub datasets: std::collections::BTreeMap<DatasetId, StoredDataset>,
    pub columns: std::collections::BTreeMap<ColumnId, StoredColumn>,
    /// Column ids that must not be removed (e.g. still used by a chart).
    #[serde(default)]
    pub pinned: std::collections::BTreeSet<ColumnId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDataset {
    pub record: DatasetRecord,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredColumn {
    pub dataset_id: DatasetId,
    pub catalog_path: String,
    pub data: ColumnData,
}

impl DatastoreState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn upsert_dataset(&mut self, record: &DatasetRecord) -> DatasetId {
        let existing = self
            .datasets
            .iter()
            .find(|(_, d)| d.record.catalog_path == record.catalog_path)
            .map(|(id, _)| *id);

        match existing {
            Some(id) => {
                if let Some(stored) = self.datasets.get_mut(&id) {
                    stored.record = record.clone();
                }
                id
            }
            None => {
                let id = self.allocate();
                self.datasets.insert(
                    id,
                    StoredDataset {
                        record: record.clone(),
                        checksum: None,
                    },
                );
                id
            }
        }
    }

    pub fn upsert_column(
        &mut self,
        dataset_id: DatasetId,
        catalog_path: &str,
        data: &ColumnData,
    ) -> Result<ColumnId> {
        if !self.datasets.contains_key(&dataset_id) {
            anyhow::bail!("unknown dataset id {dataset_id}");
        }

        let existing = self
            .columns
            .iter()
            .find(|(_, c)| c.catalog_path == catalog_path)
            .map(|(id, _)| *id);
        let id = match existing {
            Some(id) => id,
            None => self.allocate(),
        };

        self.columns.insert(
            id,
            StoredColumn {
                dataset_id,
                catalog_path: catalog_path.to_string(),
                data: data.clone(),
            },
        );
        Ok(id)
    }

    pub fn cleanup_ghost_columns(&mut self, dataset_id: DatasetId, keep: &[ColumnId]) -> bool {
        let ghosts: Vec<ColumnId> = self
            .columns
            .iter()
            .filter(|(id, c)| c.dataset_id == dataset_id && !keep.contains(*id))
            .map(|(id, _)| *id)
            .collect();

        let mut success = true;
        for id in ghosts {
            if self.pinned.contains(&id) {
                success = false;
            } else {
                self.columns.remove(&id);
            }
        }
        success
    }

    pub fn fetch_checksum(&self, catalog_path: &str) -> Option<String> {
        self.datasets
            .values()
            .find(|d| d.record.catalog_path == catalog_path)
            .and_then(|d| d.checksum.clone())
    }

    pub fn set_checksum(&mut self, dataset_id: DatasetId, checksum: &str) -> Result<()> {
        match self.datasets.get_mut(&dataset_id) {
            Some(d) => {
                d.checksum = Some(checksum.to_string());
                Ok(())
            }
            None => anyhow::bail!("unknown dataset id {dataset_id}"),
        }
    }

    /// Columns currently stored for the dataset at `catalog_path`.
    pub fn columns_of(&self, catalog_path: &str) -> Vec<&StoredColumn> {
        let ids: Vec<DatasetId> = self
            .datasets
            .iter()
            .filter(|(_, d)| d.record.catalog_path == catalog_path)
            .map(|(id, _)| *id)
            .collect();
        self.columns
            .values()
            .filter(|c| ids.contains(&c.dataset_id))
            .collect()
    }
}
