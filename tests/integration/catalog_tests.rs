//! End-to-end catalog building, loading and round-trip behavior.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use dirdb::catalog::builder::build_catalog;
use dirdb::catalog::codec::{self, read_catalog, sidecar_path};
use dirdb::catalog::SIDECAR_NAME;
use dirdb::hasher::sha3_128;
use dirdb::index::TreeIndex;
use dirdb::walker::{load_tree, LoadPolicy};
use tempfile::TempDir;

const BUFSIZE: usize = 64 * 1024;

fn write_file(dir: &Path, name: &str, content: &[u8]) {
    File::create(dir.join(name)).unwrap().write_all(content).unwrap();
}

#[test]
fn test_empty_directory_catalog_and_stats() {
    let dir = TempDir::new().unwrap();
    let catalogs = load_tree(dir.path(), LoadPolicy::ReadOnly, BUFSIZE, None).unwrap();
    assert_eq!(catalogs.len(), 1);
    assert!(catalogs[0].files.is_empty());
    assert!(sidecar_path(dir.path()).exists());

    let mut index = TreeIndex::new(vec![dir.path().to_path_buf()], false);
    index.add_dirs(0, catalogs);
    let stats = index.root_stats(0);
    assert_eq!(stats.files, 0);
    assert_eq!(stats.dirs, 1);
    assert_eq!(stats.total_size, 0);
    assert_eq!(stats.redundant_files, 0);
}

#[test]
fn test_three_files_two_sizes_order_and_toc() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a", b"abc");
    write_file(dir.path(), "b", b"abd");
    write_file(dir.path(), "c", b"hello");

    let catalog = build_catalog(dir.path(), None, BUFSIZE, None).unwrap();
    let names: Vec<_> = catalog.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c"], "size 3 before 5, abc before abd");

    // The on-disk TOC must hold one run per distinct size.
    let blob = fs::read(sidecar_path(dir.path())).unwrap();
    let decoded = codec::decode(&blob, &sidecar_path(dir.path())).unwrap();
    assert_eq!(dirdb::catalog::toc_runs(&decoded), vec![(3, 0), (5, 2)]);

    // And the index can tell the three contents apart.
    let mut index = TreeIndex::new(vec![dir.path().to_path_buf()], false);
    index.add_dirs(0, vec![catalog]);
    let bits = index.min_unique_hash_bits();
    assert!(bits >= 1 && bits <= 128);
    assert_eq!(
        bits,
        {
            // Recompute from the known digests.
            let mut hashes = [sha3_128(b"abc"), sha3_128(b"abd"), sha3_128(b"hello")];
            hashes.sort();
            let max_common = hashes[0]
                .common_leading_bits(hashes[1])
                .max(hashes[1].common_leading_bits(hashes[2]));
            max_common + 1
        }
    );
}

#[test]
fn test_build_then_decode_round_trips() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "one", b"payload one");
    write_file(dir.path(), "two", b"payload 2");
    fs::create_dir(dir.path().join("sub")).unwrap();

    let built = build_catalog(dir.path(), None, BUFSIZE, None).unwrap();
    let decoded = read_catalog(dir.path()).unwrap();
    assert_eq!(decoded.files, built.files);

    // Canonical form: re-serializing the decoded catalog is byte-identical.
    let blob = fs::read(sidecar_path(dir.path())).unwrap();
    assert_eq!(codec::encode(&decoded.files), blob);
}

#[test]
fn test_update_mode_does_not_rehash_unchanged_tree() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "data", b"lots of content here");
    fs::create_dir(dir.path().join("nested")).unwrap();
    write_file(&dir.path().join("nested"), "more", b"even more content");

    load_tree(dir.path(), LoadPolicy::ReadOnly, BUFSIZE, None).unwrap();
    let updated = load_tree(dir.path(), LoadPolicy::Update, BUFSIZE, None).unwrap();
    for catalog in &updated {
        assert_eq!(
            catalog.hashed_bytes, 0,
            "unchanged {} must not hash",
            catalog.path.display()
        );
    }
}

#[test]
fn test_changed_file_is_rehashed_and_relisted() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "volatile", b"before");
    load_tree(dir.path(), LoadPolicy::ReadOnly, BUFSIZE, None).unwrap();

    write_file(dir.path(), "volatile", b"after!!");
    let updated = load_tree(dir.path(), LoadPolicy::Update, BUFSIZE, None).unwrap();
    assert_eq!(updated[0].files[0].hash, sha3_128(b"after!!"));
    assert_eq!(updated[0].files[0].size, 7);
}

#[test]
fn test_sidecar_not_listed_as_content() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "real", b"data");
    load_tree(dir.path(), LoadPolicy::ReadOnly, BUFSIZE, None).unwrap();
    let again = load_tree(dir.path(), LoadPolicy::ForceNew, BUFSIZE, None).unwrap();
    let names: Vec<_> = again[0].files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["real"]);
    assert!(!names.contains(&SIDECAR_NAME));
}
