// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Component, Path, PathBuf};

/// Directories whose contents never affect a step fingerprint.
const IGNORED_COMPONENTS: &[&str] = &["__pycache__", ".ipynb_checkpoints", ".git"];

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Falls back to comparing canonicalized paths when a plain
/// `strip_prefix` fails (symlinked roots, `/private/var` on macOS).
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    None
}

/// Whether a change to `path` can make a step stale.
///
/// Editor swap files and interpreter caches are noise.
pub fn is_relevant(path: &Path) -> bool {
    let in_ignored_dir = path.components().any(|c| match c {
        Component::Normal(name) => IGNORED_COMPONENTS.iter().any(|i| name == *i),
        _ => false,
    });
    if in_ignored_dir {
        return false;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    !(name.ends_with('~') || name.ends_with(".swp") || name.starts_with(".#"))
}

/// Whether `path` is one of `dirs` or lies below one of them.
pub fn is_under_any(path: &Path, dirs: &[PathBuf]) -> bool {
    dirs.iter().any(|d| path.starts_with(d))
}
