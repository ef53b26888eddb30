//! Copy one side's unique intersection files into a fresh tree.

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{DirdbError, Result};
use crate::index::TreeIndex;

/// Copy every file unique to `side` (root index) into `dest`, preserving
/// the root-relative layout.
///
/// The destination must not exist at all; refusing an existing directory is
/// deliberately stricter than checking emptiness.
pub fn extract_unique(index: &TreeIndex, side: usize, dest: &Path) -> Result<u64> {
    if dest.exists() {
        return Err(DirdbError::Conflict {
            path: dest.to_path_buf(),
            detail: "extract destination exists".to_string(),
        });
    }
    fs::create_dir_all(dest).map_err(|e| DirdbError::io(dest, e))?;

    let root = &index.roots()[side].path;
    let mut copied = 0u64;
    for refs in index.content_buckets().values() {
        if !refs.iter().all(|r| r.root == side) {
            continue;
        }
        for file_ref in refs {
            let rel = file_ref
                .path
                .strip_prefix(root)
                .map_err(|_| DirdbError::Conflict {
                    path: file_ref.path.clone(),
                    detail: "file outside its root".to_string(),
                })?;
            let target = dest.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| DirdbError::io(parent, e))?;
            }
            debug!("extracting {} -> {}", file_ref.path.display(), target.display());
            fs::copy(&file_ref.path, &target).map_err(|e| DirdbError::io(&target, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}
