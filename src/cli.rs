//! Command-line interface definitions.
//!
//! All options live in one flat [`Cli`] struct (clap derive); the surface is
//! flags plus one or more positional directories. Combination rules that
//! clap cannot express (mode exclusivity, flags that require `--intersect`)
//! are enforced by [`validate`].
//!
//! # Example
//!
//! ```bash
//! # Statistics for one tree (default mode)
//! dirdb ~/archive
//!
//! # Compare two trees and drop the copies in the second one
//! dirdb --intersect --remove-copies ~/master ~/backup
//!
//! # Collapse duplicates into hardlinks, 1 MiB minimum
//! dirdb --hardlink-copies --min-size 1M ~/archive
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::error::{DirdbError, Result};

/// Operations on huge directory trees.
///
/// Maintains a per-directory catalog file (`.dirdb`) with content
/// fingerprints and answers cross-tree identity questions from it. All
/// sizes accept the suffixes k, M, G, T, P, E (powers of 1024).
#[derive(Debug, Parser)]
#[command(name = "dirdb", version, about, long_about = None)]
pub struct Cli {
    /// Directories to operate on.
    #[arg(required = true, value_name = "DIR")]
    pub dirs: Vec<PathBuf>,

    /// Print statistics for each dir (number of files, total size,
    /// redundancy). Default when no other mode is given.
    #[arg(short = 's', long)]
    pub stats: bool,

    /// List all files with their stored metadata.
    #[arg(short = 'l', long)]
    pub list_files: bool,

    /// Print a size histogram of all files, with bucket width N.
    #[arg(long, value_name = "N", value_parser = parse_size)]
    pub size_histogram: Option<u64>,

    /// Maximum file size to include in the size histogram.
    #[arg(long, value_name = "N", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Determine the intersection of the given dirs: for every dir, which
    /// files are unique to it and which are shared with any other dir.
    #[arg(short = 'i', long)]
    pub intersect: bool,

    /// List files only in the first dir (with --intersect, exactly 2 dirs).
    #[arg(long)]
    pub list_a: bool,

    /// List files only in the second dir (with --intersect, exactly 2 dirs).
    #[arg(long)]
    pub list_b: bool,

    /// List files present in both dirs (with --intersect, exactly 2 dirs).
    #[arg(long)]
    pub list_both: bool,

    /// Extract files only in the first dir into DIR (must not exist).
    #[arg(long, value_name = "DIR")]
    pub extract_a: Option<PathBuf>,

    /// Extract files only in the second dir into DIR (must not exist).
    #[arg(long, value_name = "DIR")]
    pub extract_b: Option<PathBuf>,

    /// With --intersect: delete duplicates from later dirs, keeping the
    /// copies in the earliest dir on the command line.
    #[arg(long)]
    pub remove_copies: bool,

    /// Treat files as identical only if content and basename both match.
    #[arg(long)]
    pub same_filename: bool,

    /// Replace duplicate files by hardlinks to the oldest copy.
    #[arg(long)]
    pub hardlink_copies: bool,

    /// Minimum file size for --hardlink-copies.
    #[arg(long, value_name = "N", value_parser = parse_size, default_value = "1")]
    pub min_size: u64,

    /// Skip groups whose anchor already has this many hardlinks.
    #[arg(long, value_name = "N", default_value_t = 60_000)]
    pub max_hardlinks: u64,

    /// Measure raw sequential read throughput (no other mode allowed).
    #[arg(long)]
    pub readbench: bool,

    /// Force creation of new catalog files, overwriting existing ones.
    #[arg(long)]
    pub new_dirdb: bool,

    /// Update catalog files, reusing hashes when inode/size/mtime match.
    #[arg(short = 'u', long)]
    pub update_dirdb: bool,

    /// Recursively remove all catalog files under the given dirs.
    #[arg(long)]
    pub remove_dirdb: bool,

    /// Print the minimum hash length in bits that separates all contents.
    #[arg(long)]
    pub get_unique_hash_len: bool,

    /// Only log mutations instead of performing them.
    #[arg(long)]
    pub dry_run: bool,

    /// Print progress once per second. Twice for newline-separated updates.
    #[arg(short = 'p', long, action = ArgAction::Count)]
    pub progress: u8,

    /// Maximum width of the progress line.
    #[arg(short = 'W', long, value_name = "N", default_value_t = 199)]
    pub width: usize,

    /// Read buffer size for hashing and --readbench.
    #[arg(long, value_name = "N", value_parser = parse_size, default_value = "1M")]
    pub bufsize: u64,

    /// Increase verbosity. Specify multiple times to be more verbose.
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Whether any explicit mode flag was given. Without one, `--stats`
    /// is implied.
    #[must_use]
    pub fn has_explicit_mode(&self) -> bool {
        self.stats
            || self.list_files
            || self.size_histogram.is_some()
            || self.intersect
            || self.list_a
            || self.list_b
            || self.list_both
            || self.extract_a.is_some()
            || self.extract_b.is_some()
            || self.hardlink_copies
            || self.readbench
            || self.update_dirdb
            || self.remove_dirdb
            || self.get_unique_hash_len
    }
}

/// Parse a size with optional k/M/G/T/P/E suffix (powers of 1024).
pub fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size".to_string());
    }
    let (number, shift) = match s.as_bytes()[s.len() - 1] {
        b'k' | b'K' => (&s[..s.len() - 1], 10),
        b'm' | b'M' => (&s[..s.len() - 1], 20),
        b'g' | b'G' => (&s[..s.len() - 1], 30),
        b't' | b'T' => (&s[..s.len() - 1], 40),
        b'p' | b'P' => (&s[..s.len() - 1], 50),
        b'e' | b'E' => (&s[..s.len() - 1], 60),
        _ => (s, 0),
    };
    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid size '{s}' (expected an integer with optional kMGTPE suffix)"))?;
    value
        .checked_shl(shift)
        .filter(|_| shift == 0 || value < (1u64 << (64 - shift)))
        .ok_or_else(|| format!("size '{s}' does not fit into 64 bits"))
}

/// Enforce the flag combination rules clap cannot express.
pub fn validate(cli: &Cli) -> Result<()> {
    let usage = |message: &str| Err(DirdbError::Usage(message.to_string()));

    if cli.readbench {
        let other_mode = cli.stats
            || cli.list_files
            || cli.size_histogram.is_some()
            || cli.intersect
            || cli.list_a
            || cli.list_b
            || cli.list_both
            || cli.extract_a.is_some()
            || cli.extract_b.is_some()
            || cli.hardlink_copies
            || cli.update_dirdb
            || cli.remove_dirdb
            || cli.get_unique_hash_len;
        if other_mode || cli.new_dirdb || cli.remove_copies || cli.dry_run {
            return usage("--readbench cannot be combined with any other mode");
        }
    }
    if cli.new_dirdb && cli.update_dirdb {
        return usage("cannot combine --new-dirdb with --update-dirdb");
    }
    if (cli.list_a || cli.list_b || cli.list_both) && !cli.intersect {
        return usage("--list-a/--list-b/--list-both require --intersect");
    }
    if (cli.extract_a.is_some() || cli.extract_b.is_some()) && !cli.intersect {
        return usage("--extract-a/--extract-b require --intersect");
    }
    if cli.remove_copies && !cli.intersect {
        return usage("--remove-copies requires --intersect");
    }
    if cli.intersect && cli.dirs.len() < 2 {
        return usage("--intersect requires at least two directories");
    }
    let two_root_listing = cli.list_a
        || cli.list_b
        || cli.list_both
        || cli.extract_a.is_some()
        || cli.extract_b.is_some();
    if two_root_listing && cli.dirs.len() != 2 {
        return usage("--list-a/--list-b/--list-both/--extract-a/--extract-b require exactly two directories");
    }
    if cli.dry_run && !(cli.remove_copies || cli.hardlink_copies) {
        return usage("--dry-run is only valid with --remove-copies or --hardlink-copies");
    }
    if cli.size_histogram == Some(0) {
        return usage("size-histogram bucket size must be greater than 0");
    }
    Ok(())
}
