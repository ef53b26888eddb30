//! Collapse duplicate files into hardlinks.
//!
//! Groups are content-key buckets with at least two members, each at least
//! the minimum size. Within a group the oldest file (ties broken by path)
//! becomes the anchor; every other member is atomically replaced by a
//! hardlink to it. Replacement goes through a sibling temporary so the
//! target path always resolves to either the old inode or the anchor's
//! inode, never to nothing:
//!
//! ```text
//! original -> tmp-linked (tmp = anchor, target unchanged)
//!          -> anchor-owned (rename over target)
//! fallback:   tmp-linked -> target-missing -> anchor-owned (remove + rename)
//! abort:      tmp removed, original intact
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::catalog::builder::update_catalog;
use crate::catalog::codec::sidecar_path;
use crate::error::{DirdbError, Result};
use crate::index::{FileRef, TreeIndex};
use crate::progress::ProgressTracker;

/// Suffix for the transient link names placed next to each target.
const LINK_TMP_SUFFIX: &str = ".lnktmp";

/// Counters for one hardlink run; valid even after an aborted run.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardlinkStats {
    /// Number of file bodies replaced by links.
    pub removed_files: u64,
    /// Bytes those bodies occupied.
    pub removed_bytes: u64,
    /// Groups skipped because the anchor was already at the link cap.
    pub skipped_groups: u64,
}

#[cfg(unix)]
fn live_link_count(path: &Path) -> Result<u64> {
    use std::os::unix::fs::MetadataExt;
    let metadata = fs::metadata(path).map_err(|e| DirdbError::io(path, e))?;
    Ok(metadata.nlink())
}

#[cfg(not(unix))]
fn live_link_count(path: &Path) -> Result<u64> {
    let _ = fs::metadata(path).map_err(|e| DirdbError::io(path, e))?;
    Ok(1)
}

/// Pick a free sibling temporary next to `target`.
fn free_tmp_path(target: &Path) -> Result<PathBuf> {
    let base = target.as_os_str().to_string_lossy().into_owned();
    let first = PathBuf::from(format!("{base}{LINK_TMP_SUFFIX}"));
    if !first.exists() {
        return Ok(first);
    }
    for counter in 1..10_000u32 {
        let candidate = PathBuf::from(format!("{base}{LINK_TMP_SUFFIX}{counter}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(DirdbError::Conflict {
        path: target.to_path_buf(),
        detail: "no free temporary path for hardlink replacement".to_string(),
    })
}

/// Replace `target` with a hardlink to `anchor`.
///
/// The target keeps resolving to a complete file at every instant: first
/// the link is created under a temporary name, then renamed over the
/// target. If the rename is refused, the target is removed and the rename
/// retried; if that also fails the temporary is cleaned up and the original
/// is left in place.
fn replace_with_link(anchor: &Path, target: &Path) -> Result<()> {
    let tmp = free_tmp_path(target)?;
    fs::hard_link(anchor, &tmp).map_err(|e| DirdbError::io(&tmp, e))?;

    if let Err(rename_err) = fs::rename(&tmp, target) {
        debug!(
            "rename over {} failed ({rename_err}), retrying via remove",
            target.display()
        );
        let fallback = fs::remove_file(target).and_then(|()| fs::rename(&tmp, target));
        if let Err(e) = fallback {
            let _ = fs::remove_file(&tmp);
            return Err(DirdbError::io(target, e));
        }
    }
    Ok(())
}

/// Order groups by age: oldest mtime first, path as the tiebreaker.
fn pick_anchor<'a>(refs: &'a [FileRef]) -> &'a FileRef {
    refs.iter()
        .min_by(|a, b| a.mtime.cmp(&b.mtime).then_with(|| a.path.cmp(&b.path)))
        .expect("groups have at least two members")
}

/// Collapse every eligible duplicate group into hardlinks to its anchor.
///
/// `min_size` excludes small files, `max_links` caps the anchor's resulting
/// hard-link count (groups whose anchor is already at the cap are skipped
/// with a warning). With `dry_run` the replacements are only announced.
pub fn hardlink_copies(
    index: &TreeIndex,
    min_size: u64,
    max_links: u64,
    bufsize: usize,
    dry_run: bool,
    progress: Option<&ProgressTracker>,
    stats: &mut HardlinkStats,
) -> Result<()> {
    let mut dirty_dirs: BTreeSet<PathBuf> = BTreeSet::new();

    for (key, refs) in index.content_buckets() {
        if refs.len() < 2 || key.size < min_size {
            continue;
        }
        let anchor = pick_anchor(&refs);
        let targets: Vec<&FileRef> = refs
            .iter()
            .filter(|r| r.path != anchor.path && r.inode != anchor.inode)
            .collect();
        if targets.is_empty() {
            continue;
        }

        if !dry_run {
            let links = live_link_count(&anchor.path)?;
            if links >= max_links {
                warn!(
                    "skipping group of {} ({} already has {links} links, cap {max_links})",
                    refs.len(),
                    anchor.path.display()
                );
                stats.skipped_groups += 1;
                continue;
            }
        }

        for target in targets {
            if dry_run {
                println!(
                    "Would hardlink {} -> {}",
                    target.path.display(),
                    anchor.path.display()
                );
            } else {
                debug!(
                    "hardlinking {} -> {}",
                    target.path.display(),
                    anchor.path.display()
                );
                replace_with_link(&anchor.path, &target.path)?;
                dirty_dirs.insert(target.dir.clone());
                dirty_dirs.insert(anchor.dir.clone());
            }
            stats.removed_files += 1;
            stats.removed_bytes += target.size;
        }
    }

    for dir in dirty_dirs {
        if sidecar_path(&dir).exists() {
            update_catalog(&dir, bufsize, progress)?;
        }
    }
    Ok(())
}
