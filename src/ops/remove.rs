//! Cross-root duplicate removal.
//!
//! For every content key present in more than one root, the earliest root
//! (smallest index on the command line) keeps its files; every occurrence in
//! a later root is deleted. Catalogs of directories that lost files are then
//! rebuilt in update mode so the sidecars stay consistent.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use log::debug;

use crate::catalog::builder::update_catalog;
use crate::catalog::codec::sidecar_path;
use crate::error::{DirdbError, Result};
use crate::index::TreeIndex;
use crate::progress::ProgressTracker;

/// Counters for one removal run. Partially completed work is visible here
/// even when the run aborts on an I/O error.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveStats {
    pub removed_files: u64,
    pub removed_bytes: u64,
}

/// Delete later-root copies of every multi-root content key.
///
/// With `dry_run` the removals are only announced; counters still reflect
/// what would have happened. The first failing deletion aborts the run.
pub fn remove_copies(
    index: &TreeIndex,
    bufsize: usize,
    dry_run: bool,
    progress: Option<&ProgressTracker>,
    stats: &mut RemoveStats,
) -> Result<()> {
    let mut dirty_dirs: BTreeSet<PathBuf> = BTreeSet::new();

    for refs in index.content_buckets().values() {
        let Some(earliest) = refs.iter().map(|r| r.root).min() else {
            continue;
        };
        if refs.iter().all(|r| r.root == earliest) {
            continue;
        }
        for file_ref in refs.iter().filter(|r| r.root != earliest) {
            if dry_run {
                println!("Would remove {}", file_ref.path.display());
            } else {
                debug!("removing {}", file_ref.path.display());
                fs::remove_file(&file_ref.path)
                    .map_err(|e| DirdbError::io(&file_ref.path, e))?;
                dirty_dirs.insert(file_ref.dir.clone());
            }
            stats.removed_files += 1;
            stats.removed_bytes += file_ref.size;
        }
    }

    for dir in dirty_dirs {
        if sidecar_path(&dir).exists() {
            update_catalog(&dir, bufsize, progress)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::codec::read_catalog;
    use crate::walker::{load_tree, LoadPolicy};
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    const BUFSIZE: usize = 64 * 1024;

    fn write_file(dir: &Path, name: &str, content: &[u8]) {
        File::create(dir.join(name)).unwrap().write_all(content).unwrap();
    }

    fn loaded_index(scratch: &TempDir) -> TreeIndex {
        let root_a = scratch.path().join("a");
        let root_b = scratch.path().join("b");
        let mut index = TreeIndex::new(vec![root_a.clone(), root_b.clone()], false);
        index.add_dirs(0, load_tree(&root_a, LoadPolicy::ReadOnly, BUFSIZE, None).unwrap());
        index.add_dirs(1, load_tree(&root_b, LoadPolicy::ReadOnly, BUFSIZE, None).unwrap());
        index
    }

    fn two_roots() -> TempDir {
        let scratch = TempDir::new().unwrap();
        let root_a = scratch.path().join("a");
        let root_b = scratch.path().join("b");
        std::fs::create_dir(&root_a).unwrap();
        std::fs::create_dir(&root_b).unwrap();
        write_file(&root_a, "f1", b"same");
        write_file(&root_a, "f2", b"onlyA");
        write_file(&root_b, "g1", b"same");
        write_file(&root_b, "g2", b"onlyB");
        scratch
    }

    #[test]
    fn test_remove_copies_deletes_later_root_only() {
        let scratch = two_roots();
        let index = loaded_index(&scratch);

        let mut stats = RemoveStats::default();
        remove_copies(&index, BUFSIZE, false, None, &mut stats).unwrap();

        assert_eq!(stats.removed_files, 1);
        assert_eq!(stats.removed_bytes, 4);
        assert!(scratch.path().join("a/f1").exists(), "earliest root untouched");
        assert!(scratch.path().join("a/f2").exists());
        assert!(!scratch.path().join("b/g1").exists(), "later copy removed");
        assert!(scratch.path().join("b/g2").exists());
    }

    #[test]
    fn test_remove_copies_refreshes_sidecar() {
        let scratch = two_roots();
        let index = loaded_index(&scratch);
        let mut stats = RemoveStats::default();
        remove_copies(&index, BUFSIZE, false, None, &mut stats).unwrap();

        let refreshed = read_catalog(&scratch.path().join("b")).unwrap();
        let names: Vec<_> = refreshed.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["g2"], "removed file no longer listed");
    }

    #[test]
    fn test_remove_copies_dry_run_touches_nothing() {
        let scratch = two_roots();
        let index = loaded_index(&scratch);
        let before = read_catalog(&scratch.path().join("b")).unwrap();

        let mut stats = RemoveStats::default();
        remove_copies(&index, BUFSIZE, true, None, &mut stats).unwrap();

        assert_eq!(stats.removed_files, 1);
        assert_eq!(stats.removed_bytes, 4);
        assert!(scratch.path().join("b/g1").exists());
        let after = read_catalog(&scratch.path().join("b")).unwrap();
        assert_eq!(after.files, before.files, "sidecar untouched");
    }

    #[test]
    fn test_duplicates_within_one_root_are_kept() {
        let scratch = TempDir::new().unwrap();
        let root_a = scratch.path().join("a");
        let root_b = scratch.path().join("b");
        std::fs::create_dir(&root_a).unwrap();
        std::fs::create_dir(&root_b).unwrap();
        write_file(&root_a, "f1", b"twice");
        write_file(&root_a, "f2", b"twice");
        write_file(&root_b, "other", b"different");
        let index = loaded_index(&scratch);

        let mut stats = RemoveStats::default();
        remove_copies(&index, BUFSIZE, false, None, &mut stats).unwrap();
        assert_eq!(stats.removed_files, 0);
        assert!(scratch.path().join("a/f1").exists());
        assert!(scratch.path().join("a/f2").exists());
    }

    #[test]
    fn test_three_roots_keep_earliest_only() {
        let scratch = TempDir::new().unwrap();
        let roots: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|name| {
                let root = scratch.path().join(name);
                std::fs::create_dir(&root).unwrap();
                write_file(&root, "dup", b"spread");
                root
            })
            .collect();
        let mut index = TreeIndex::new(roots.clone(), false);
        for (i, root) in roots.iter().enumerate() {
            index.add_dirs(i, load_tree(root, LoadPolicy::ReadOnly, BUFSIZE, None).unwrap());
        }

        let mut stats = RemoveStats::default();
        remove_copies(&index, BUFSIZE, false, None, &mut stats).unwrap();
        assert_eq!(stats.removed_files, 2);
        assert!(roots[0].join("dup").exists());
        assert!(!roots[1].join("dup").exists());
        assert!(!roots[2].join("dup").exists());
    }
}
