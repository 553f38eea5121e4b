// src/steps/hooks.rs

use std::path::Path;

use tracing::debug;

use crate::catalog::DatasetIndex;
use crate::errors::Result;

/// Extra work done after a data step has written its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostRunHook {
    /// Flag the dataset as not public in its index.
    MarkPrivate,
}

impl PostRunHook {
    pub fn apply(&self, dest_dir: &Path) -> Result<()> {
        match self {
            PostRunHook::MarkPrivate => {
                let mut index = DatasetIndex::read(dest_dir)?;
                index.is_public = false;
                index.write(dest_dir)?;
                debug!(dataset = ?dest_dir, "marked dataset private");
                Ok(())
            }
        }
    }
}
