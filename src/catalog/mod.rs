// src/catalog/mod.rs

//! Datasets on disk and in the remote catalog.

pub mod dataset;
pub mod remote;

pub use dataset::{Dataset, DatasetIndex, INDEX_FILE, Table, index_mtime};
pub use remote::{HttpCatalog, RemoteCatalog, download_if_current, http_client};
