//! In-memory aggregation across all loaded catalogs.
//!
//! # Overview
//!
//! [`TreeIndex`] collects every [`DirCatalog`] loaded for the roots given on
//! the command line and answers the content-identity questions: per-root
//! statistics, size histograms, N-way intersection and the minimum hash
//! prefix that still separates all distinct contents.
//!
//! Identity is the [`ContentKey`]: two files with equal size and equal
//! fingerprint are the same content. With the same-filename mode active the
//! fingerprint is first re-hashed together with the basename, so only files
//! that also share a name compare equal. Every consumer of the index (stats,
//! intersection, mutation) goes through the same key.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::catalog::{DirCatalog, FileEntry};
use crate::hasher::Hash128;
use crate::output::{
    self, format_percent, format_size, format_size_frac, histogram_unit, FileRow, StatLine,
};

/// Identity tuple for content aggregation. Ordering is size first, then
/// fingerprint, so related buckets sort next to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentKey {
    pub size: u64,
    pub hash: Hash128,
}

/// One root directory given on the command line.
#[derive(Debug, Clone)]
pub struct RootEntry {
    pub path: PathBuf,
    pub elapsed_seconds: f64,
}

/// A file projected out of its catalog, with its owning directory and root.
#[derive(Debug, Clone)]
pub struct FileRef {
    pub path: PathBuf,
    pub dir: PathBuf,
    pub size: u64,
    pub hash: Hash128,
    pub inode: u64,
    pub mtime: u64,
    pub num_links: u64,
    /// Index of the root this file was loaded under.
    pub root: usize,
}

/// Aggregate statistics for one root.
#[derive(Debug, Clone, Default)]
pub struct RootStats {
    pub dirs: u64,
    pub files: u64,
    pub total_size: u64,
    pub redundant_files: u64,
    pub redundant_size: u64,
    pub db_size: u64,
    pub hashed_bytes: u64,
    pub hash_seconds: f64,
}

/// Unique/shared split of one root against all others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootIntersect {
    pub unique_files: u64,
    pub unique_bytes: u64,
    pub shared_files: u64,
    pub shared_bytes: u64,
}

impl RootIntersect {
    fn total_files(self) -> u64 {
        self.unique_files + self.shared_files
    }

    fn total_bytes(self) -> u64 {
        self.unique_bytes + self.shared_bytes
    }
}

/// Per-root splits plus the grand totals.
#[derive(Debug, Clone, Default)]
pub struct IntersectReport {
    pub per_root: Vec<RootIntersect>,
    pub totals: RootIntersect,
}

/// One size-histogram bucket starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramBucket {
    pub start: u64,
    pub count: u64,
    pub total_size: u64,
}

/// All catalogs of one invocation, indexed by content.
pub struct TreeIndex {
    roots: Vec<RootEntry>,
    dirs: Vec<(usize, DirCatalog)>,
    same_filename: bool,
}

impl TreeIndex {
    /// Create an index over the given roots.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, same_filename: bool) -> Self {
        Self {
            roots: roots
                .into_iter()
                .map(|path| RootEntry {
                    path,
                    elapsed_seconds: 0.0,
                })
                .collect(),
            dirs: Vec::new(),
            same_filename,
        }
    }

    /// Record the catalogs loaded while walking `root_index`.
    pub fn add_dirs(&mut self, root_index: usize, catalogs: Vec<DirCatalog>) {
        debug_assert!(root_index < self.roots.len());
        self.dirs
            .extend(catalogs.into_iter().map(|catalog| (root_index, catalog)));
    }

    /// Record the wall time spent loading `root_index`.
    pub fn set_root_elapsed(&mut self, root_index: usize, seconds: f64) {
        self.roots[root_index].elapsed_seconds = seconds;
    }

    #[must_use]
    pub fn roots(&self) -> &[RootEntry] {
        &self.roots
    }

    #[must_use]
    pub fn dir_catalogs(&self) -> impl Iterator<Item = &DirCatalog> {
        self.dirs.iter().map(|(_, catalog)| catalog)
    }

    /// The identity key of one catalog entry under the active mode.
    #[must_use]
    pub fn content_key(&self, file: &FileEntry) -> ContentKey {
        let hash = if self.same_filename {
            file.hash.combined_with_name(&file.name)
        } else {
            file.hash
        };
        ContentKey {
            size: file.size,
            hash,
        }
    }

    /// Every file as a [`FileRef`], in load order.
    #[must_use]
    pub fn file_refs(&self) -> Vec<FileRef> {
        let mut refs = Vec::new();
        for (root, catalog) in &self.dirs {
            for file in &catalog.files {
                refs.push(FileRef {
                    path: catalog.path.join(&file.name),
                    dir: catalog.path.clone(),
                    size: file.size,
                    hash: file.hash,
                    inode: file.inode,
                    mtime: file.mtime,
                    num_links: file.num_links,
                    root: *root,
                });
            }
        }
        refs
    }

    /// All files grouped by content key, preserving load order per bucket.
    #[must_use]
    pub fn content_buckets(&self) -> BTreeMap<ContentKey, Vec<FileRef>> {
        let mut buckets: BTreeMap<ContentKey, Vec<FileRef>> = BTreeMap::new();
        for (root, catalog) in &self.dirs {
            for file in &catalog.files {
                buckets
                    .entry(self.content_key(file))
                    .or_default()
                    .push(FileRef {
                        path: catalog.path.join(&file.name),
                        dir: catalog.path.clone(),
                        size: file.size,
                        hash: file.hash,
                        inode: file.inode,
                        mtime: file.mtime,
                        num_links: file.num_links,
                        root: *root,
                    });
            }
        }
        buckets
    }

    /// Aggregate statistics for one root.
    #[must_use]
    pub fn root_stats(&self, root_index: usize) -> RootStats {
        let mut stats = RootStats::default();
        let mut content_counts: BTreeMap<ContentKey, u64> = BTreeMap::new();
        for (root, catalog) in &self.dirs {
            if *root != root_index {
                continue;
            }
            stats.dirs += 1;
            stats.files += catalog.files.len() as u64;
            stats.db_size += catalog.db_size;
            stats.hashed_bytes += catalog.hashed_bytes;
            stats.hash_seconds += catalog.hash_seconds;
            for file in &catalog.files {
                stats.total_size += file.size;
                *content_counts.entry(self.content_key(file)).or_default() += 1;
            }
        }
        for (key, count) in content_counts {
            let extra = count.saturating_sub(1);
            stats.redundant_files += extra;
            stats.redundant_size += extra * key.size;
        }
        stats
    }

    /// Bucketize all files by `floor(size / batch) * batch`.
    ///
    /// Files above `max_size` are skipped when a limit is given. The result
    /// is dense: every bucket from zero through the last occupied one is
    /// present, including empty buckets.
    #[must_use]
    pub fn size_histogram(&self, batch: u64, max_size: Option<u64>) -> Vec<HistogramBucket> {
        assert!(batch > 0);
        let mut sparse: BTreeMap<u64, (u64, u64)> = BTreeMap::new();
        for (_, catalog) in &self.dirs {
            for file in &catalog.files {
                if max_size.is_some_and(|max| file.size > max) {
                    continue;
                }
                let start = file.size / batch * batch;
                let bucket = sparse.entry(start).or_default();
                bucket.0 += 1;
                bucket.1 += file.size;
            }
        }
        let Some((&max_start, _)) = sparse.last_key_value() else {
            return Vec::new();
        };
        (0..=max_start)
            .step_by(batch as usize)
            .map(|start| {
                let (count, total_size) = sparse.get(&start).copied().unwrap_or_default();
                HistogramBucket {
                    start,
                    count,
                    total_size,
                }
            })
            .collect()
    }

    /// Split every root's files into unique and shared under the active
    /// content key.
    #[must_use]
    pub fn intersect(&self) -> IntersectReport {
        let root_count = self.roots.len();
        let mut per_key: BTreeMap<ContentKey, Vec<u64>> = BTreeMap::new();
        for (root, catalog) in &self.dirs {
            for file in &catalog.files {
                per_key
                    .entry(self.content_key(file))
                    .or_insert_with(|| vec![0; root_count])[*root] += 1;
            }
        }

        let mut report = IntersectReport {
            per_root: vec![RootIntersect::default(); root_count],
            totals: RootIntersect::default(),
        };
        for (key, counts) in per_key {
            let roots_present = counts.iter().filter(|&&c| c > 0).count();
            for (root, &count) in counts.iter().enumerate() {
                if count == 0 {
                    continue;
                }
                let split = &mut report.per_root[root];
                if roots_present > 1 {
                    split.shared_files += count;
                    split.shared_bytes += count * key.size;
                } else {
                    split.unique_files += count;
                    split.unique_bytes += count * key.size;
                }
            }
        }
        for split in &report.per_root {
            report.totals.unique_files += split.unique_files;
            report.totals.unique_bytes += split.unique_bytes;
            report.totals.shared_files += split.shared_files;
            report.totals.shared_bytes += split.shared_bytes;
        }
        report
    }

    /// Length in bits of the shortest prefix separating all distinct
    /// fingerprints: 0 for fewer than two distinct hashes, otherwise the
    /// maximum common prefix between adjacent sorted hashes plus one,
    /// capped at 128.
    #[must_use]
    pub fn min_unique_hash_bits(&self) -> u32 {
        let mut hashes: Vec<Hash128> = self
            .dirs
            .iter()
            .flat_map(|(_, catalog)| catalog.files.iter().map(|f| f.hash))
            .collect();
        hashes.sort_unstable();
        hashes.dedup();
        if hashes.len() <= 1 {
            return 0;
        }
        // Sorting puts the longest shared prefixes next to each other, so
        // only adjacent pairs need to be inspected.
        let max_common = hashes
            .windows(2)
            .map(|pair| pair[0].common_leading_bits(pair[1]))
            .max()
            .unwrap_or(0);
        (max_common + 1).min(128)
    }

    /// Hex digits needed to print unambiguous hash prefixes, clamped to
    /// [4, 32].
    #[must_use]
    pub fn unique_hash_hex_len(&self) -> usize {
        (self.min_unique_hash_bits() as usize).div_ceil(4).clamp(4, 32)
    }

    // --- presentation ------------------------------------------------------

    /// Print per-root statistics blocks.
    pub fn print_stats(&self) {
        for (root_index, root) in self.roots.iter().enumerate() {
            let stats = self.root_stats(root_index);
            let pct = |part: u64, whole: u64| {
                if whole == 0 {
                    format_percent(0.0)
                } else {
                    format_percent(100.0 * part as f64 / whole as f64)
                }
            };
            let db_per_file = if stats.files == 0 {
                0.0
            } else {
                stats.db_size as f64 / stats.files as f64
            };

            let mut lines = vec![
                StatLine::new("files:", stats.files.to_string()),
                StatLine::new("dirs:", stats.dirs.to_string()),
                StatLine::new("total-size:", format_size(stats.total_size)),
                StatLine::with_extra(
                    "redundant-files:",
                    stats.redundant_files.to_string(),
                    format!("({})", pct(stats.redundant_files, stats.files)),
                ),
                StatLine::with_extra(
                    "redundant-size:",
                    format_size(stats.redundant_size),
                    format!("({})", pct(stats.redundant_size, stats.total_size)),
                ),
                StatLine::with_extra(
                    "dirdb-size:",
                    format_size(stats.db_size),
                    format!("({})", pct(stats.db_size, stats.total_size)),
                ),
                StatLine::new("dirdb-bytes-per-file:", format_size_frac(db_per_file)),
            ];
            if stats.hashed_bytes > 0 && stats.hash_seconds > 0.0 {
                let rate = stats.hashed_bytes as f64 / stats.hash_seconds / (1024.0 * 1024.0);
                lines.push(StatLine::new("hash-size:", format_size(stats.hashed_bytes)));
                lines.push(StatLine::new("hash-rate:", format!("{rate:.1} MB/s")));
            }
            if root.elapsed_seconds > 0.0 {
                lines.push(StatLine::new(
                    "elapsed:",
                    output::format_elapsed(root.elapsed_seconds),
                ));
            }

            println!("{}", root.path.display());
            output::print_stat_list(&lines);
        }
    }

    /// List every file with its stored metadata.
    pub fn print_list_files(&self, show_inode_links: bool) {
        let hash_len = self.unique_hash_hex_len();
        let rows: Vec<FileRow> = self
            .file_refs()
            .iter()
            .map(|r| file_row(r, hash_len))
            .collect();
        output::print_file_rows(&rows, show_inode_links);
    }

    /// Print the size histogram. Verbosity adds the bucket end boundary
    /// (>=1) and a proportional bar (>=2).
    pub fn print_size_histogram(&self, batch: u64, max_size: Option<u64>, verbose: u8) {
        let buckets = self.size_histogram(batch, max_size);
        if buckets.is_empty() {
            return;
        }
        let unit = histogram_unit(batch);
        let show_end = verbose > 0;
        let show_bar = verbose > 1;

        let boundary = |value: u64| format!("{} {}", value / unit.factor, unit.label);
        let start_width = buckets
            .iter()
            .map(|b| boundary(b.start).len())
            .max()
            .unwrap_or(0);
        let end_width = buckets
            .iter()
            .map(|b| boundary(b.start + batch).len())
            .max()
            .unwrap_or(0);
        let count_width = buckets
            .iter()
            .map(|b| b.count.to_string().len())
            .max()
            .unwrap_or(0);
        let total_width = buckets
            .iter()
            .map(|b| format_size(b.total_size).len())
            .max()
            .unwrap_or(0);
        let max_total = buckets.iter().map(|b| b.total_size).max().unwrap_or(0);

        for bucket in &buckets {
            let range = if show_end {
                format!(
                    "{:<start_width$}..{:<end_width$}:",
                    boundary(bucket.start),
                    boundary(bucket.start + batch)
                )
            } else {
                format!("{:<start_width$}:", boundary(bucket.start))
            };
            let mut line = format!(
                "{range} {:>count_width$} {:>total_width$}",
                bucket.count,
                format_size(bucket.total_size)
            );
            if show_bar && max_total > 0 {
                let available = 79usize.saturating_sub(line.len() + 1);
                let mut bar_len = (bucket.total_size as u128 * available as u128
                    / max_total as u128) as usize;
                if bucket.total_size > 0 && bar_len == 0 {
                    bar_len = 1;
                }
                if bar_len > 0 {
                    line.push(' ');
                    line.push_str(&"#".repeat(bar_len));
                }
            }
            println!("{line}");
        }
    }

    /// Print the intersection report, optionally listing the files behind
    /// each bucket (two-root invocations only).
    pub fn print_intersect(&self, list_a: bool, list_b: bool, list_both: bool, verbose: u8) {
        let report = self.intersect();
        for (root, split) in self.roots.iter().zip(&report.per_root) {
            let pct = |part: u64, whole: u64| {
                if whole == 0 {
                    format_percent(0.0)
                } else {
                    format_percent(100.0 * part as f64 / whole as f64)
                }
            };
            println!("{}:", root.path.display());
            output::print_stat_list(&[
                StatLine::with_extra(
                    "unique-files:",
                    split.unique_files.to_string(),
                    format!("({})", pct(split.unique_files, split.total_files())),
                ),
                StatLine::with_extra(
                    "unique-size:",
                    format_size(split.unique_bytes),
                    format!("({})", pct(split.unique_bytes, split.total_bytes())),
                ),
                StatLine::with_extra(
                    "shared-files:",
                    split.shared_files.to_string(),
                    format!("({})", pct(split.shared_files, split.total_files())),
                ),
                StatLine::with_extra(
                    "shared-size:",
                    format_size(split.shared_bytes),
                    format!("({})", pct(split.shared_bytes, split.total_bytes())),
                ),
            ]);
        }
        println!("total:");
        output::print_stat_list(&[
            StatLine::new("total-files:", report.totals.total_files().to_string()),
            StatLine::new("total-size:", format_size(report.totals.total_bytes())),
            StatLine::new("unique-files:", report.totals.unique_files.to_string()),
            StatLine::new("unique-size:", format_size(report.totals.unique_bytes)),
            StatLine::new("shared-files:", report.totals.shared_files.to_string()),
            StatLine::new("shared-size:", format_size(report.totals.shared_bytes)),
        ]);

        if list_a || list_b || list_both {
            let hash_len = self.unique_hash_hex_len();
            let buckets = self.content_buckets();
            let list_side = |side: usize, label: &str| {
                println!("only-in-{label}:");
                let refs: Vec<&FileRef> = buckets
                    .values()
                    .filter(|refs| refs.iter().all(|r| r.root == side))
                    .flatten()
                    .collect();
                print_ref_list(&refs, verbose, hash_len);
            };
            if list_a {
                list_side(0, "A");
            }
            if list_b {
                list_side(1, "B");
            }
            if list_both {
                println!("in-both:");
                let mut labeled = Vec::new();
                for refs in buckets.values() {
                    if refs.iter().any(|r| r.root == 0) && refs.iter().any(|r| r.root == 1) {
                        for side in [0, 1] {
                            for r in refs.iter().filter(|r| r.root == side) {
                                let mut labeled_ref = r.clone();
                                labeled_ref.path = PathBuf::from(format!(
                                    "{}: {}",
                                    if side == 0 { "A" } else { "B" },
                                    r.path.display()
                                ));
                                labeled.push(labeled_ref);
                            }
                        }
                    }
                }
                let refs: Vec<&FileRef> = labeled.iter().collect();
                print_ref_list(&refs, verbose, hash_len);
            }
        }
    }

    /// Print the minimum unique hash length in bits.
    pub fn print_unique_hash_len(&self) {
        println!("unique-hash-len: {}", self.min_unique_hash_bits());
    }
}

fn file_row(r: &FileRef, hash_len: usize) -> FileRow {
    let hex = r.hash.to_hex();
    FileRow {
        size: r.size.to_string(),
        hash: hex[..hash_len.min(hex.len())].to_string(),
        inode: r.inode.to_string(),
        date: output::format_filetime(r.mtime),
        links: r.num_links.to_string(),
        path: r.path.display().to_string(),
    }
}

/// Listing body shared by the intersect list flags: bare paths by default,
/// full metadata rows when verbose.
fn print_ref_list(refs: &[&FileRef], verbose: u8, hash_len: usize) {
    if verbose > 0 {
        let rows: Vec<FileRow> = refs.iter().map(|r| file_row(r, hash_len)).collect();
        output::print_file_rows(&rows, verbose > 1);
    } else {
        for r in refs {
            println!("{}", r.path.display());
        }
    }
}
