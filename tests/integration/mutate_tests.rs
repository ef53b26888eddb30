//! Duplicate removal and hardlink collapsing over real trees.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use dirdb::catalog::codec::read_catalog;
use dirdb::index::TreeIndex;
use dirdb::ops::{hardlink_copies, remove_copies, HardlinkStats, RemoveStats};
use dirdb::walker::{load_tree, LoadPolicy};
use filetime::FileTime;
use tempfile::TempDir;

const BUFSIZE: usize = 64 * 1024;

fn write_file(dir: &Path, name: &str, content: &[u8]) {
    File::create(dir.join(name)).unwrap().write_all(content).unwrap();
}

fn load_index(roots: &[PathBuf]) -> TreeIndex {
    let mut index = TreeIndex::new(roots.to_vec(), false);
    for (i, root) in roots.iter().enumerate() {
        index.add_dirs(i, load_tree(root, LoadPolicy::ReadOnly, BUFSIZE, None).unwrap());
    }
    index
}

#[test]
fn test_remove_copies_end_to_end() {
    let scratch = TempDir::new().unwrap();
    let root_a = scratch.path().join("a");
    let root_b = scratch.path().join("b");
    fs::create_dir(&root_a).unwrap();
    fs::create_dir(&root_b).unwrap();
    write_file(&root_a, "f1", b"same");
    write_file(&root_a, "f2", b"onlyA");
    write_file(&root_b, "g1", b"same");
    write_file(&root_b, "g2", b"onlyB");

    let index = load_index(&[root_a.clone(), root_b.clone()]);
    let mut stats = RemoveStats::default();
    remove_copies(&index, BUFSIZE, false, None, &mut stats).unwrap();

    assert_eq!(stats.removed_files, 1);
    assert_eq!(stats.removed_bytes, 4);
    assert!(root_a.join("f1").exists());
    assert!(root_a.join("f2").exists());
    assert!(!root_b.join("g1").exists());
    assert!(root_b.join("g2").exists());

    // B's sidecar no longer lists the removed file.
    let refreshed = read_catalog(&root_b).unwrap();
    let names: Vec<_> = refreshed.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["g2"]);

    // And the remaining intersection is empty.
    let after = load_index(&[root_a, root_b]);
    assert_eq!(after.intersect().totals.shared_files, 0);
}

#[test]
fn test_remove_copies_law_earliest_root_keeps_all() {
    // A key occurring twice in root 0 and once in each of roots 1 and 2
    // loses exactly the two later-root copies.
    let scratch = TempDir::new().unwrap();
    let roots: Vec<PathBuf> = ["a", "b", "c"]
        .iter()
        .map(|name| {
            let root = scratch.path().join(name);
            fs::create_dir(&root).unwrap();
            root
        })
        .collect();
    write_file(&roots[0], "copy1", b"content");
    write_file(&roots[0], "copy2", b"content");
    write_file(&roots[1], "copy3", b"content");
    write_file(&roots[2], "copy4", b"content");

    let index = load_index(&roots);
    let mut stats = RemoveStats::default();
    remove_copies(&index, BUFSIZE, false, None, &mut stats).unwrap();

    assert_eq!(stats.removed_files, 2, "c - count_in_earliest_root");
    assert!(roots[0].join("copy1").exists());
    assert!(roots[0].join("copy2").exists());
    assert!(!roots[1].join("copy3").exists());
    assert!(!roots[2].join("copy4").exists());
}

#[test]
#[cfg(unix)]
fn test_hardlink_copies_end_to_end() {
    use std::os::unix::fs::MetadataExt;

    let root = TempDir::new().unwrap();
    let older = root.path().join("older");
    let newer = root.path().join("newer");
    write_file(root.path(), "older", b"ten bytes!");
    write_file(root.path(), "newer", b"ten bytes!");
    filetime::set_file_mtime(&older, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    filetime::set_file_mtime(&newer, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    let older_inode = fs::metadata(&older).unwrap().ino();

    let index = load_index(&[root.path().to_path_buf()]);
    let mut stats = HardlinkStats::default();
    hardlink_copies(&index, 1, 60_000, BUFSIZE, false, None, &mut stats).unwrap();

    assert_eq!(stats.removed_files, 1);
    assert_eq!(stats.removed_bytes, 10);
    assert!(older.exists() && newer.exists());
    assert_eq!(fs::metadata(&older).unwrap().ino(), older_inode);
    assert_eq!(fs::metadata(&newer).unwrap().ino(), older_inode);
    assert_eq!(fs::metadata(&older).unwrap().nlink(), 2);

    // No temporaries left behind.
    let leftovers: Vec<_> = fs::read_dir(root.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains("lnktmp"))
        .collect();
    assert!(leftovers.is_empty());

    // The refreshed catalog agrees with the filesystem.
    let refreshed = read_catalog(root.path()).unwrap();
    assert!(refreshed.files.iter().all(|f| f.num_links == 2));
    assert_eq!(refreshed.files[0].inode, refreshed.files[1].inode);
}

#[test]
#[cfg(unix)]
fn test_hardlink_groups_of_three() {
    use std::os::unix::fs::MetadataExt;

    let root = TempDir::new().unwrap();
    for name in ["one", "two", "three"] {
        write_file(root.path(), name, b"grouped content");
    }
    filetime::set_file_mtime(
        &root.path().join("two"),
        FileTime::from_unix_time(1_000_000, 0),
    )
    .unwrap();

    let index = load_index(&[root.path().to_path_buf()]);
    let mut stats = HardlinkStats::default();
    hardlink_copies(&index, 1, 60_000, BUFSIZE, false, None, &mut stats).unwrap();

    // g - 1 new links, all pointing at the oldest file's inode.
    assert_eq!(stats.removed_files, 2);
    let anchor_inode = fs::metadata(root.path().join("two")).unwrap().ino();
    for name in ["one", "three"] {
        assert_eq!(fs::metadata(root.path().join(name)).unwrap().ino(), anchor_inode);
    }
    assert_eq!(fs::metadata(root.path().join("two")).unwrap().nlink(), 3);
}

#[test]
fn test_dry_run_reports_without_mutating() {
    let scratch = TempDir::new().unwrap();
    let root_a = scratch.path().join("a");
    let root_b = scratch.path().join("b");
    fs::create_dir(&root_a).unwrap();
    fs::create_dir(&root_b).unwrap();
    write_file(&root_a, "same", b"hello");
    write_file(&root_b, "same", b"hello");

    let index = load_index(&[root_a.clone(), root_b.clone()]);
    let mut stats = RemoveStats::default();
    remove_copies(&index, BUFSIZE, true, None, &mut stats).unwrap();

    assert_eq!(stats.removed_files, 1);
    assert_eq!(stats.removed_bytes, 5);
    assert!(root_a.join("same").exists());
    assert!(root_b.join("same").exists());
}
