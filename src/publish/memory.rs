// src/publish/memory.rs

use std::sync::{Mutex, MutexGuard};

use anyhow::Result;

use super::{ColumnData, ColumnId, DatasetId, DatasetRecord, Datastore, DatastoreState};

/// In-memory [`Datastore`]. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    state: Mutex<DatastoreState>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state, for assertions.
    pub fn snapshot(&self) -> DatastoreState {
        self.lock().clone()
    }

    /// Prevent ghost cleanup from removing the column at `catalog_path`.
    pub fn pin_column(&self, catalog_path: &str) {
        let mut state = self.lock();
        let ids: Vec<ColumnId> = state
            .columns
            .iter()
            .filter(|(_, c)| c.catalog_path == catalog_path)
            .map(|(id, _)| *id)
            .collect();
        state.pinned.extend(ids);
    }

    fn lock(&self) -> MutexGuard<'_, DatastoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Datastore for MemoryDatastore {
    fn upsert_dataset(&self, dataset: &DatasetRecord) -> Result<DatasetId> {
        Ok(self.lock().upsert_dataset(dataset))
    }

    fn upsert_column(
        &self,
        dataset_id: DatasetId,
        catalog_path: &str,
        data: &ColumnData,
    ) -> Result<ColumnId> {
        self.lock().upsert_column(dataset_id, catalog_path, data)
    }

    fn cleanup_ghost_columns(&self, dataset_id: DatasetId, keep: &[ColumnId]) -> Result<bool> {
        Ok(self.lock().cleanup_ghost_columns(dataset_id, keep))
    }

    fn fetch_checksum(&self, catalog_path: &str) -> Result<Option<String>> {
        Ok(self.lock().fetch_checksum(catalog_path))
    }

    fn set_checksum(&self, dataset_id: DatasetId, checksum: &str) -> Result<()> {
        self.lock().set_checksum(dataset_id, checksum)
    }
}
