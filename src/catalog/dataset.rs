// src/catalog/dataset.rs

//! On-disk dataset layout.
//!
//! A dataset is a directory holding `index.json` plus any number of artifact
//! files. Tables are stored as `<short_name>.table.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{EtlError, Result};

pub const INDEX_FILE: &str = "index.json";
pub const TABLE_SUFFIX: &str = ".table.json";

fn default_true() -> bool {
    true
}

/// Contents of `<dataset>/index.json`.
///
/// Unknown keys written by a transform are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetIndex {
    /// Input fingerprint the dataset was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_checksum: Option<String>,

    #[serde(default = "default_true")]
    pub is_public: bool,

    /// Artifact files of the dataset, relative to its directory.
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for DatasetIndex {
    fn default() -> Self {
        Self {
            source_checksum: None,
            is_public: true,
            files: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl DatasetIndex {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let path = Self::path_in(dir);
        let contents = fs::read_to_string(&path).map_err(|e| EtlError::io(&path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        let path = Self::path_in(dir);
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents).map_err(|e| EtlError::io(&path, e))
    }
}

/// Modification time of a dataset's index, if it has one.
pub fn index_mtime(dir: &Path) -> Option<SystemTime> {
    fs::metadata(DatasetIndex::path_in(dir))
        .and_then(|m| m.modified())
        .ok()
}

/// One table of a dataset, stored column-wise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub short_name: String,

    /// Names of the columns forming the row index (e.g. `country`, `year`).
    #[serde(default)]
    pub index: Vec<String>,

    #[serde(default)]
    pub columns: BTreeMap<String, Vec<Value>>,
}

impl Table {
    pub fn new(short_name: impl Into<String>) -> Self {
        Self {
            short_name: short_name.into(),
            index: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn with_index(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        let name = name.into();
        self.index.push(name.clone());
        self.columns.insert(name, values);
        self
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.columns.insert(name.into(), values);
        self
    }

    /// Number of rows (length of the longest column).
    pub fn len(&self) -> usize {
        self.columns.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Columns that are not part of the index.
    pub fn value_columns(&self) -> impl Iterator<Item = (&String, &Vec<Value>)> {
        self.columns
            .iter()
            .filter(|(name, _)| !self.index.contains(*name))
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.short_name, TABLE_SUFFIX)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| EtlError::io(path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        let path = dir.join(self.file_name());
        let contents = serde_json::to_string(self)?;
        fs::write(&path, contents).map_err(|e| EtlError::io(&path, e))
    }
}

/// Handle on a dataset directory.
#[derive(Debug, Clone)]
pub struct Dataset {
    dir: PathBuf,
}

impl Dataset {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn index(&self) -> Result<DatasetIndex> {
        DatasetIndex::read(&self.dir)
    }

    /// Read the index, or start a fresh one if the transform did not write
    /// any.
    pub fn index_or_default(&self) -> Result<DatasetIndex> {
        match DatasetIndex::read(&self.dir) {
            Ok(index) => Ok(index),
            Err(EtlError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(DatasetIndex::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Every artifact file below the dataset directory except `index.json`,
    /// relative and sorted.
    pub fn artifact_files(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        collect_files(&self.dir, &self.dir, &mut out)?;
        out.retain(|f| f != INDEX_FILE);
        out.sort();
        Ok(out)
    }

    /// All tables of the dataset, ordered by file name.
    pub fn tables(&self) -> Result<Vec<Table>> {
        let mut tables = Vec::new();
        for file in self.artifact_files()? {
            if file.ends_with(TABLE_SUFFIX) {
                tables.push(Table::read(&self.dir.join(&file))?);
            }
        }
        Ok(tables)
    }

    /// Record `source_checksum` and the current file list, keeping anything
    /// else the transform put in the index.
    pub fn finalize(&self, source_checksum: &str) -> Result<()> {
        let mut index = self.index_or_default()?;
        index.source_checksum = Some(source_checksum.to_string());
        index.files = self.artifact_files()?;
        index.write(&self.dir)
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| EtlError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EtlError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}
