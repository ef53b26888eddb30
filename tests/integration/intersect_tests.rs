//! Redundancy statistics and N-way intersection over real trees.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use dirdb::index::TreeIndex;
use dirdb::walker::{load_tree, LoadPolicy};
use tempfile::TempDir;

const BUFSIZE: usize = 64 * 1024;

fn write_file(dir: &Path, name: &str, content: &[u8]) {
    File::create(dir.join(name)).unwrap().write_all(content).unwrap();
}

fn load_index(roots: &[PathBuf], same_filename: bool) -> TreeIndex {
    let mut index = TreeIndex::new(roots.to_vec(), same_filename);
    for (i, root) in roots.iter().enumerate() {
        index.add_dirs(i, load_tree(root, LoadPolicy::ReadOnly, BUFSIZE, None).unwrap());
    }
    index
}

#[test]
fn test_redundancy_within_one_root() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("d1")).unwrap();
    fs::create_dir(root.path().join("d2")).unwrap();
    write_file(&root.path().join("d1"), "first", b"xyz");
    write_file(&root.path().join("d2"), "second", b"xyz");

    let index = load_index(&[root.path().to_path_buf()], false);
    let stats = index.root_stats(0);
    assert_eq!(stats.files, 2);
    assert_eq!(stats.dirs, 3);
    assert_eq!(stats.redundant_files, 1);
    assert_eq!(stats.redundant_size, 3);
}

#[test]
fn test_intersection_across_two_roots() {
    let scratch = TempDir::new().unwrap();
    let root_a = scratch.path().join("a");
    let root_b = scratch.path().join("b");
    fs::create_dir(&root_a).unwrap();
    fs::create_dir(&root_b).unwrap();
    write_file(&root_a, "f1", b"same");
    write_file(&root_a, "f2", b"onlyA");
    write_file(&root_b, "g1", b"same");
    write_file(&root_b, "g2", b"onlyB");

    let index = load_index(&[root_a, root_b], false);
    let report = index.intersect();
    assert_eq!(report.per_root[0].unique_files, 1);
    assert_eq!(report.per_root[0].shared_files, 1);
    assert_eq!(report.per_root[1].unique_files, 1);
    assert_eq!(report.per_root[1].shared_files, 1);
    assert_eq!(report.totals.unique_files, 2);
    assert_eq!(report.totals.shared_files, 2);
}

#[test]
fn test_same_filename_narrows_identity() {
    let scratch = TempDir::new().unwrap();
    let root_a = scratch.path().join("a");
    let root_b = scratch.path().join("b");
    fs::create_dir(&root_a).unwrap();
    fs::create_dir(&root_b).unwrap();
    // Identical content under different names, plus one true match.
    write_file(&root_a, "renamed_here", b"same bytes");
    write_file(&root_b, "renamed_there", b"same bytes");
    write_file(&root_a, "kept.txt", b"more bytes");
    write_file(&root_b, "kept.txt", b"more bytes");

    let plain = load_index(
        &[root_a.clone(), root_b.clone()],
        false,
    );
    assert_eq!(plain.intersect().per_root[0].shared_files, 2);

    let strict = load_index(&[root_a, root_b], true);
    let report = strict.intersect();
    assert_eq!(report.per_root[0].shared_files, 1, "only the name match survives");
    assert_eq!(report.per_root[0].unique_files, 1);
}

#[test]
fn test_hash_len_separates_distinct_contents() {
    let root = TempDir::new().unwrap();
    write_file(root.path(), "a", b"abc");
    write_file(root.path(), "b", b"abd");
    write_file(root.path(), "c", b"hello");

    let index = load_index(&[root.path().to_path_buf()], false);
    let bits = index.min_unique_hash_bits();
    assert!(bits >= 1, "three distinct contents need at least one bit");
    let nibbles = index.unique_hash_hex_len();
    assert!((4..=32).contains(&nibbles));
    assert_eq!(nibbles, (bits as usize).div_ceil(4).clamp(4, 32));
}

#[test]
fn test_sidecars_do_not_change_identity_results() {
    // Loading a tree twice (second time from sidecars) gives identical
    // intersection results.
    let scratch = TempDir::new().unwrap();
    let root_a = scratch.path().join("a");
    let root_b = scratch.path().join("b");
    fs::create_dir(&root_a).unwrap();
    fs::create_dir(&root_b).unwrap();
    write_file(&root_a, "x", b"shared payload");
    write_file(&root_b, "y", b"shared payload");

    let cold = load_index(&[root_a.clone(), root_b.clone()], false);
    let warm = load_index(&[root_a, root_b], false);
    assert_eq!(cold.intersect().totals, warm.intersect().totals);
    assert!(
        warm.dir_catalogs().all(|c| c.hashed_bytes == 0),
        "second load reads catalogs instead of hashing"
    );
}
