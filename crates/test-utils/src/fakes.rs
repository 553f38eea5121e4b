use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use serde_json::json;

use etldag::catalog::{DatasetIndex, RemoteCatalog, Table};
use etldag::exec::Transform;

/// A transform that:
/// - records every step it was asked to run
/// - writes its tables plus an `index.json` into the destination
pub struct RecordingTransform {
    runs: AtomicUsize,
    steps: Mutex<Vec<String>>,
    tables: Vec<Table>,
    save: bool,
    fail: bool,
}

impl RecordingTransform {
    /// Writes one table `t` indexed by `country`/`year` with a `value`
    /// column.
    pub fn new() -> Self {
        let table = Table::new("t")
            .with_index("country", vec![json!("France"), json!("Peru")])
            .with_index("year", vec![json!(2020), json!(2020)])
            .with_column("value", vec![json!(1.5), json!(null)]);
        Self::with_tables(vec![table])
    }

    pub fn with_tables(tables: Vec<Table>) -> Self {
        Self {
            runs: AtomicUsize::new(0),
            steps: Mutex::new(Vec::new()),
            tables,
            save: true,
            fail: false,
        }
    }

    /// Runs without writing anything.
    pub fn without_save(mut self) -> Self {
        self.save = false;
        self
    }

    /// Every run returns an error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }
}

impl Default for RecordingTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for RecordingTransform {
    fn run(&self, step: &str, dest_dir: &Path) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.steps.lock().unwrap().push(step.to_string());

        if self.fail {
            bail!("transform for {step} failed");
        }
        if !self.save {
            return Ok(());
        }

        fs::create_dir_all(dest_dir)?;
        for table in self.tables.iter() {
            table.write(dest_dir)?;
        }
        let mut index = DatasetIndex::default();
        index
            .extra
            .insert("title".to_string(), json!(format!("Built by {step}")));
        index.write(dest_dir)?;
        Ok(())
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

/// In-memory remote catalog.
#[derive(Default)]
pub struct FakeCatalog {
    datasets: BTreeMap<String, (DatasetIndex, BTreeMap<String, Vec<u8>>)>,
    unreachable: bool,
    fetches: AtomicUsize,
    downloads: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request fails, as if the catalog were offline.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Publish a dataset with the given source checksum and files.
    pub fn with_dataset(mut self, path: &str, source_checksum: &str, files: &[(&str, &str)]) -> Self {
        let index = DatasetIndex {
            source_checksum: Some(source_checksum.to_string()),
            files: files.iter().map(|(name, _)| name.to_string()).collect(),
            ..DatasetIndex::default()
        };
        let contents = files
            .iter()
            .map(|(name, body)| (name.to_string(), body.as_bytes().to_vec()))
            .collect();
        self.datasets.insert(path.to_string(), (index, contents));
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl RemoteCatalog for FakeCatalog {
    fn fetch_index(&self, path: &str) -> Result<Option<DatasetIndex>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            bail!("catalog unreachable");
        }
        Ok(self.datasets.get(path).map(|(index, _)| index.clone()))
    }

    fn download(&self, path: &str, file: &str, dest: &Path) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let (_, files) = self
            .datasets
            .get(path)
            .ok_or_else(|| anyhow!("no dataset {path}"))?;
        let body = files
            .get(file)
            .ok_or_else(|| anyhow!("no file {file} in {path}"))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, body)?;
        Ok(())
    }
}
