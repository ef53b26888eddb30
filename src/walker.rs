//! Recursive tree loading.
//!
//! Walks a root top-down and applies the catalog policy to every directory:
//! read the existing sidecar, force a fresh build, or rebuild with hash
//! reuse. Enumeration problems (permission denied, entries vanishing during
//! the walk) are logged and skipped; a sidecar that exists but fails to
//! decode aborts the operation so a corrupt catalog cannot silently drop a
//! directory from set operations.
//!
//! The walk itself is serial; the engine is synchronous end to end.

use std::path::Path;

use jwalk::{Parallelism, WalkDir};
use log::{debug, warn};

use crate::catalog::builder::{build_catalog, update_catalog};
use crate::catalog::{codec, DirCatalog};
use crate::error::{DirdbError, Result};
use crate::progress::ProgressTracker;

/// What to do with each directory's sidecar during the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Decode an existing sidecar; build one only where missing.
    ReadOnly,
    /// Always build fresh, overwriting any existing sidecar.
    ForceNew,
    /// Rebuild, reusing hashes from an existing sidecar where the
    /// (inode, size, mtime) triple is unchanged.
    Update,
}

/// Load or build the catalog of a single directory per the policy.
fn load_dir(
    dir: &Path,
    policy: LoadPolicy,
    bufsize: usize,
    progress: Option<&ProgressTracker>,
) -> Result<DirCatalog> {
    let has_sidecar = codec::sidecar_path(dir).exists();
    match policy {
        LoadPolicy::ReadOnly if has_sidecar => {
            let catalog = codec::read_catalog(dir)?;
            if let Some(tracker) = progress {
                tracker.on_dir_start(dir);
                tracker.add_dir_summary(catalog.files.len() as u64, catalog.total_bytes());
            }
            Ok(catalog)
        }
        LoadPolicy::Update if has_sidecar => update_catalog(dir, bufsize, progress),
        _ => build_catalog(dir, None, bufsize, progress),
    }
}

/// Serial top-down walk over the directories beneath (and including) `root`.
fn walk_dirs(root: &Path) -> impl Iterator<Item = std::path::PathBuf> {
    WalkDir::new(root)
        .parallelism(Parallelism::Serial)
        .follow_links(false)
        .skip_hidden(false)
        .sort(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_dir() => Some(entry.path()),
            Ok(_) => None,
            Err(e) => {
                warn!("skipping entry during walk: {e}");
                None
            }
        })
}

/// Apply the load policy to every directory under `root`, top-down.
///
/// Returns the loaded catalogs in walk order (the root's own catalog
/// first).
///
/// # Errors
///
/// Propagates codec errors from existing sidecars and I/O errors from
/// catalog builds; walk-level enumeration errors are logged and skipped.
pub fn load_tree(
    root: &Path,
    policy: LoadPolicy,
    bufsize: usize,
    progress: Option<&ProgressTracker>,
) -> Result<Vec<DirCatalog>> {
    let mut catalogs = Vec::new();
    for dir in walk_dirs(root) {
        catalogs.push(load_dir(&dir, policy, bufsize, progress)?);
    }
    Ok(catalogs)
}

/// Recursively delete every sidecar under `root`. Returns the number
/// removed.
pub fn remove_sidecars(root: &Path) -> Result<u64> {
    let mut removed = 0;
    for dir in walk_dirs(root) {
        let db_path = codec::sidecar_path(&dir);
        if db_path.exists() {
            std::fs::remove_file(&db_path).map_err(|e| DirdbError::io(&db_path, e))?;
            debug!("removed {}", db_path.display());
            removed += 1;
        }
    }
    Ok(removed)
}
