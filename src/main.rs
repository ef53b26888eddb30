//! Entry point: option validation and orchestration.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use dirdb::catalog::SIDECAR_NAME;
use dirdb::cli::{self, Cli};
use dirdb::error::DirdbError;
use dirdb::index::TreeIndex;
use dirdb::logging;
use dirdb::ops::{self, HardlinkStats, RemoveStats};
use dirdb::output::{self, format_size, StatLine};
use dirdb::paths::normalize_path;
use dirdb::progress::{ProgressMode, ProgressTracker};
use dirdb::walker::{self, LoadPolicy};

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);
    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    cli::validate(cli)?;

    // Catch path problems before any tree work starts.
    for dir in &cli.dirs {
        if !dir.exists() {
            return Err(DirdbError::Usage(format!("path '{}' does not exist", dir.display())).into());
        }
        if !dir.is_dir() {
            return Err(
                DirdbError::Usage(format!("path '{}' is not a directory", dir.display())).into(),
            );
        }
    }
    let roots: Vec<PathBuf> = cli.dirs.iter().map(|dir| normalize_path(dir)).collect();

    let progress = match cli.progress {
        0 => None,
        1 => Some(ProgressTracker::new(ProgressMode::Redraw, cli.width)),
        _ => Some(ProgressTracker::new(ProgressMode::Lines, cli.width)),
    };
    let bufsize = cli.bufsize.max(1) as usize;

    if cli.remove_dirdb {
        let mut removed = 0;
        for root in &roots {
            removed += walker::remove_sidecars(root)?;
        }
        log::info!("removed {removed} {SIDECAR_NAME} files");
        return Ok(());
    }

    if cli.readbench {
        let stats = ops::read_bench(&roots, bufsize, progress.as_ref())?;
        if let Some(tracker) = &progress {
            tracker.finish();
        }
        output::print_stat_list(&[
            StatLine::new("read-files:", stats.files.to_string()),
            StatLine::new("read-size:", format_size(stats.bytes)),
            StatLine::new("read-time:", output::format_elapsed(stats.seconds)),
            StatLine::new("read-rate:", format!("{:.1} MB/s", stats.rate() / (1024.0 * 1024.0))),
        ]);
        return Ok(());
    }

    // Load or build every catalog under every root, in command-line order.
    let policy = if cli.new_dirdb {
        LoadPolicy::ForceNew
    } else if cli.update_dirdb {
        LoadPolicy::Update
    } else {
        LoadPolicy::ReadOnly
    };
    let mut index = TreeIndex::new(roots.clone(), cli.same_filename);
    for (root_index, root) in roots.iter().enumerate() {
        let started = Instant::now();
        let catalogs = walker::load_tree(root, policy, bufsize, progress.as_ref())?;
        index.add_dirs(root_index, catalogs);
        index.set_root_elapsed(root_index, started.elapsed().as_secs_f64());
    }
    if let Some(tracker) = &progress {
        tracker.finish();
    }

    if cli.intersect {
        index.print_intersect(cli.list_a, cli.list_b, cli.list_both, cli.verbose);
        if let Some(dest) = &cli.extract_a {
            let copied = ops::extract_unique(&index, 0, &normalize_path(dest))?;
            log::info!("extracted {copied} files to {}", dest.display());
        }
        if let Some(dest) = &cli.extract_b {
            let copied = ops::extract_unique(&index, 1, &normalize_path(dest))?;
            log::info!("extracted {copied} files to {}", dest.display());
        }
        if cli.remove_copies {
            let mut stats = RemoveStats::default();
            let result = ops::remove_copies(
                &index,
                bufsize,
                cli.dry_run,
                progress.as_ref(),
                &mut stats,
            );
            // Counters go out even when the batch stopped early.
            output::print_stat_list(&[
                StatLine::new("removed-files:", stats.removed_files.to_string()),
                StatLine::new("removed-bytes:", format_size(stats.removed_bytes)),
            ]);
            result?;
        }
        return Ok(());
    }

    if cli.hardlink_copies {
        let mut stats = HardlinkStats::default();
        let result = ops::hardlink_copies(
            &index,
            cli.min_size,
            cli.max_hardlinks,
            bufsize,
            cli.dry_run,
            progress.as_ref(),
            &mut stats,
        );
        let mut lines = vec![
            StatLine::new("removed-files:", stats.removed_files.to_string()),
            StatLine::new("removed-bytes:", format_size(stats.removed_bytes)),
        ];
        if stats.skipped_groups > 0 {
            lines.push(StatLine::new(
                "skipped-groups:",
                stats.skipped_groups.to_string(),
            ));
        }
        output::print_stat_list(&lines);
        result?;
    }

    if cli.stats || !cli.has_explicit_mode() {
        index.print_stats();
    }
    if let Some(batch) = cli.size_histogram {
        index.print_size_histogram(batch, cli.max_size, cli.verbose);
    }
    if cli.list_files {
        index.print_list_files(cli.verbose > 1);
    }
    if cli.get_unique_hash_len {
        index.print_unique_hash_len();
    }

    Ok(())
}
