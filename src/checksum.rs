// src/checksum.rs

//! Content fingerprints.
//!
//! Every fingerprint in etldag is a hex blake3 digest. A step fingerprint is
//! built from a sorted mapping of named sub-fingerprints so that the result
//! only depends on the inputs, never on iteration order.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use std::time::SystemTime;

use blake3::Hasher;
use tracing::debug;

use crate::errors::{EtlError, Result};

/// Hex digest of a string.
pub fn checksum_str(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

/// Hash the values of `parts` in key order, joined by `,`.
pub fn checksum_parts(parts: &BTreeMap<String, String>) -> String {
    let joined = parts.values().cloned().collect::<Vec<_>>().join(",");
    checksum_str(&joined)
}

/// Compute the hash of a single file, bypassing the cache.
pub fn checksum_file_nocache(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = File::open(path).map_err(|e| EtlError::io(path, e))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| EtlError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash of a file's contents, cached on `(path, mtime)`.
pub fn checksum_file(path: &Path) -> Result<String> {
    FILE_CHECKSUMS.get_or_compute(path)
}

static FILE_CHECKSUMS: LazyLock<FileChecksumCache> = LazyLock::new(FileChecksumCache::new);

/// In-memory cache of file hashes, shared by all worker threads.
///
/// Entries are keyed on path and modification time, so a file rewritten
/// during the run is hashed again.
#[derive(Debug, Default)]
pub struct FileChecksumCache {
    hashes: Mutex<HashMap<(PathBuf, SystemTime), String>>,
}

impl FileChecksumCache {
    pub fn new() -> Self {
        Self {
            hashes: Mutex::new(HashMap::new()),
        }
    }

    /// Get the hash for a file, computing and caching it if necessary.
    pub fn get_or_compute(&self, path: &Path) -> Result<String> {
        let mtime = path
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| EtlError::io(path, e))?;
        let key = (path.to_path_buf(), mtime);

        if let Some(hash) = self.lock().get(&key) {
            return Ok(hash.clone());
        }

        debug!("cache miss: computing hash for {:?}", path);
        let hash = checksum_file_nocache(path)?;
        self.lock().insert(key, hash.clone());
        Ok(hash)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(PathBuf, SystemTime), String>> {
        // A poisoned cache still holds valid hashes.
        self.hashes.lock().unwrap_or_else(|e| e.into_inner())
    }
}
