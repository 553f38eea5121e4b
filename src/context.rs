// src/context.rs

//! Everything a step needs from the outside world.

use std::fmt;
use std::sync::Arc;

use reqwest::blocking::Client;

use crate::catalog::{HttpCatalog, RemoteCatalog, http_client};
use crate::config::ConfigFile;
use crate::errors::Result;
use crate::exec::TransformRegistry;
use crate::publish::{Datastore, JsonDatastore};

/// Shared, read-only state handed to every step operation.
///
/// A `Context` is shared across the staleness worker pool, so everything in
/// it is `Sync`. It owns a blocking HTTP client and must therefore be
/// created and dropped outside of an async runtime.
#[derive(Clone)]
pub struct Context {
    pub config: Arc<ConfigFile>,
    pub http: Client,
    pub catalog: Option<Arc<dyn RemoteCatalog>>,
    pub datastore: Arc<dyn Datastore>,
    pub transforms: TransformRegistry,
}

impl Context {
    /// Production wiring: HTTP catalog from `[remote]` and a JSON datastore
    /// in the data directory.
    pub fn new(config: ConfigFile) -> Result<Self> {
        let http = http_client()?;
        let catalog: Arc<dyn RemoteCatalog> = Arc::new(HttpCatalog::new(http.clone(), &config.remote));
        let datastore: Arc<dyn Datastore> =
            Arc::new(JsonDatastore::in_data_dir(&config.paths.data_dir));

        Ok(Self {
            config: Arc::new(config),
            http,
            catalog: Some(catalog),
            datastore,
            transforms: TransformRegistry::new(),
        })
    }

    pub fn with_catalog(mut self, catalog: Option<Arc<dyn RemoteCatalog>>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = datastore;
        self
    }

    pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("catalog", &self.catalog.is_some())
            .field("transforms", &self.transforms)
            .finish()
    }
}
