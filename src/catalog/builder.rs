//! Build a catalog by scanning a single directory.
//!
//! The builder enumerates direct children only (recursion belongs to the
//! tree walker), fingerprints every regular file and atomically replaces
//! the sidecar. When a reuse cache is supplied, files whose
//! (inode, size, mtime) triple matches a cached entry keep their recorded
//! hash without being read. This trades detection of same-stat content
//! changes for speed.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, trace};

use crate::catalog::{
    codec, filetime_from_system_time, sort_entries, DirCatalog, FileEntry, SIDECAR_NAME,
};
use crate::error::{DirdbError, Result};
use crate::hasher::{hash_file, Hash128};
use crate::paths::normalize_path;
use crate::progress::ProgressTracker;

/// Stat triple identifying an unchanged file for hash reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReuseKey {
    pub inode: u64,
    pub size: u64,
    pub mtime: u64,
}

/// Map from stat triple to the previously computed fingerprint.
pub type ReuseCache = HashMap<ReuseKey, Hash128>;

/// Seed a reuse cache from an existing catalog.
#[must_use]
pub fn reuse_cache_from(catalog: &DirCatalog) -> ReuseCache {
    catalog
        .files
        .iter()
        .map(|file| {
            (
                ReuseKey {
                    inode: file.inode,
                    size: file.size,
                    mtime: file.mtime,
                },
                file.hash,
            )
        })
        .collect()
}

#[cfg(unix)]
fn inode_and_links(metadata: &fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (metadata.ino(), metadata.nlink())
}

#[cfg(not(unix))]
fn inode_and_links(_metadata: &fs::Metadata) -> (u64, u64) {
    (0, 1)
}

/// Scan `dir`, fingerprint its regular files and rewrite the sidecar.
///
/// Children that are not regular files are skipped, as is the sidecar
/// itself; entries that cannot be stat'ed (typically permission problems or
/// files vanishing mid-scan) are skipped silently. An unreadable file during
/// hashing aborts the directory.
///
/// The builder never recurses into subdirectories.
pub fn build_catalog(
    dir: &Path,
    cache: Option<&ReuseCache>,
    bufsize: usize,
    progress: Option<&ProgressTracker>,
) -> Result<DirCatalog> {
    debug!("scanning {}", dir.display());
    if let Some(tracker) = progress {
        tracker.on_dir_start(dir);
    }

    let mut entries = Vec::new();
    let mut hashed_bytes = 0u64;
    let mut hash_seconds = 0.0f64;

    let read_dir = fs::read_dir(dir).map_err(|e| DirdbError::io(dir, e))?;
    for dir_entry in read_dir {
        let dir_entry = match dir_entry {
            Ok(entry) => entry,
            Err(e) => {
                trace!("skipping unreadable entry in {}: {e}", dir.display());
                continue;
            }
        };
        let name = dir_entry.file_name();
        if name == SIDECAR_NAME {
            continue;
        }
        // DirEntry::metadata does not follow symlinks, so links, dirs and
        // special files all fail the is_file test below.
        let metadata = match dir_entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                trace!("skipping {}: {e}", dir_entry.path().display());
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let size = metadata.len();
        if let Some(tracker) = progress {
            tracker.on_file_processed(size);
        }
        let (inode, num_links) = inode_and_links(&metadata);
        let mtime = metadata
            .modified()
            .map(filetime_from_system_time)
            .unwrap_or(0);

        let cached = cache.and_then(|cache| {
            cache
                .get(&ReuseKey { inode, size, mtime })
                .copied()
        });
        let hash = match cached {
            Some(hash) => hash,
            None => {
                let (hash, seconds) = hash_file(&dir_entry.path(), size, bufsize, progress)?;
                hashed_bytes += size;
                hash_seconds += seconds;
                hash
            }
        };

        entries.push(FileEntry {
            name: name.to_string_lossy().into_owned(),
            size,
            hash,
            inode,
            mtime,
            num_links,
        });
    }
    if let Some(tracker) = progress {
        tracker.on_dir_done();
    }

    sort_entries(&mut entries);
    let db_size = codec::write_catalog(dir, &entries)?;

    Ok(DirCatalog {
        path: normalize_path(dir),
        files: entries,
        db_size,
        hashed_bytes,
        hash_seconds,
    })
}

/// Rebuild the sidecar of `dir`, reusing hashes from the existing one.
///
/// Files whose stat triple is unchanged keep their recorded fingerprint;
/// everything else is hashed fresh.
pub fn update_catalog(
    dir: &Path,
    bufsize: usize,
    progress: Option<&ProgressTracker>,
) -> Result<DirCatalog> {
    let existing = codec::read_catalog(dir)?;
    let cache = reuse_cache_from(&existing);
    build_catalog(dir, Some(&cache), bufsize, progress)
}
