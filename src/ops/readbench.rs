//! Sequential read benchmark over whole trees.
//!
//! Streams every regular file (sidecars excluded) through the configured
//! read buffer without hashing, to measure raw storage throughput with the
//! same access pattern the catalog builder uses.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use jwalk::{Parallelism, WalkDir};
use log::warn;

use crate::catalog::SIDECAR_NAME;
use crate::error::{DirdbError, Result};
use crate::progress::ProgressTracker;

/// Totals of one benchmark run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadbenchStats {
    pub files: u64,
    pub bytes: u64,
    pub seconds: f64,
}

impl ReadbenchStats {
    /// Average throughput in bytes per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        if self.seconds > 0.0 {
            self.bytes as f64 / self.seconds
        } else {
            0.0
        }
    }
}

fn read_file(path: &Path, buffer: &mut [u8]) -> Result<u64> {
    let mut file = File::open(path).map_err(|e| DirdbError::io(path, e))?;
    let mut total = 0u64;
    loop {
        match file.read(buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => total += n as u64,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(DirdbError::io(path, e)),
        }
    }
}

/// Read every file under the given roots once, sequentially.
pub fn read_bench(
    roots: &[PathBuf],
    bufsize: usize,
    progress: Option<&ProgressTracker>,
) -> Result<ReadbenchStats> {
    let mut stats = ReadbenchStats::default();
    let mut buffer = vec![0u8; bufsize.max(1)];
    let start = Instant::now();

    for root in roots {
        let walk = WalkDir::new(root)
            .parallelism(Parallelism::Serial)
            .follow_links(false)
            .skip_hidden(false)
            .sort(true);
        for entry in walk {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping entry during walk: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() == SIDECAR_NAME {
                continue;
            }
            let path = entry.path();
            if let Some(tracker) = progress {
                tracker.on_dir_start(path.parent().unwrap_or(root));
            }
            let bytes = read_file(&path, &mut buffer)?;
            stats.files += 1;
            stats.bytes += bytes;
            if let Some(tracker) = progress {
                tracker.on_file_processed(bytes);
            }
        }
    }
    stats.seconds = start.elapsed().as_secs_f64();
    Ok(stats)
}
