//! Human-readable rendering: sizes, rates, timestamps and table output.
//!
//! All size formatting uses powers of 1024 with the unit ladder
//! `bytes, kB, MB, GB, TB, PB, EB`. Timestamps are FILETIME ticks rendered
//! as UTC; the reserved zero value prints as `0000-00-00 00:00:00`.

use chrono::DateTime;

use crate::catalog::{FILETIME_TICKS_PER_SECOND, WINDOWS_TO_UNIX_EPOCH};

const UNITS: [&str; 7] = ["bytes", "kB", "MB", "GB", "TB", "PB", "EB"];

fn unit_index(bytes: u64) -> usize {
    let mut index = 0;
    let mut whole = bytes;
    while whole >= 1024 && index + 1 < UNITS.len() {
        whole >>= 10;
        index += 1;
    }
    index
}

/// Format a byte count with three decimals, e.g. `1.500 kB`.
///
/// Zero renders as `0` and sub-kilobyte values as exact integers.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0".to_string();
    }
    let index = unit_index(bytes);
    if index == 0 {
        return format!("{bytes} {}", UNITS[0]);
    }
    let value = bytes as f64 / 1024f64.powi(index as i32);
    format!("{value:.3} {}", UNITS[index])
}

/// Format a fractional byte count (e.g. bytes per file) with one decimal.
#[must_use]
pub fn format_size_frac(bytes: f64) -> String {
    if bytes <= 0.0 {
        return "0".to_string();
    }
    let index = unit_index(bytes as u64);
    let value = bytes / 1024f64.powi(index as i32);
    format!("{value:.1} {}", UNITS[index])
}

/// Compact one-decimal size used on the progress line.
#[must_use]
pub fn format_compact_size(bytes: u64) -> String {
    let index = unit_index(bytes);
    let value = bytes as f64 / 1024f64.powi(index as i32);
    format!("{value:.1} {}", UNITS[index])
}

/// Percentage with one decimal, e.g. `42.0%`.
#[must_use]
pub fn format_percent(percent: f64) -> String {
    format!("{percent:.1}%")
}

/// Throughput as megabytes per second, e.g. `118.4MB/s`.
#[must_use]
pub fn format_rate_mb(bytes_per_sec: f64) -> String {
    format!("{:.1}MB/s", bytes_per_sec / (1024.0 * 1024.0))
}

/// Elapsed wall time, e.g. `8.2s`, `3m 12s`, `1h 04m 09s`.
#[must_use]
pub fn format_elapsed(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.1}s");
    }
    let total = seconds as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else {
        format!("{m}m {s:02}s")
    }
}

/// Render FILETIME ticks as `YYYY-MM-DD HH:MM:SS` UTC.
///
/// Zero ticks (and anything before 1970) is the "unknown" sentinel.
#[must_use]
pub fn format_filetime(ticks: u64) -> String {
    const UNKNOWN: &str = "0000-00-00 00:00:00";
    if ticks == 0 {
        return UNKNOWN.to_string();
    }
    let seconds = ticks / FILETIME_TICKS_PER_SECOND;
    if seconds < WINDOWS_TO_UNIX_EPOCH {
        return UNKNOWN.to_string();
    }
    let unix = (seconds - WINDOWS_TO_UNIX_EPOCH) as i64;
    match DateTime::from_timestamp(unix, 0) {
        Some(when) => when.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => UNKNOWN.to_string(),
    }
}

/// One aligned `label: value (extra)` output line.
#[derive(Debug, Clone)]
pub struct StatLine {
    pub label: String,
    pub value: String,
    pub extra: String,
}

impl StatLine {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            extra: String::new(),
        }
    }

    pub fn with_extra(label: impl Into<String>, value: impl Into<String>, extra: String) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            extra,
        }
    }
}

/// Print a block of stat lines with aligned labels and values.
pub fn print_stat_list(lines: &[StatLine]) {
    let label_width = lines.iter().map(|l| l.label.len()).max().unwrap_or(0);
    let value_width = lines.iter().map(|l| l.value.len()).max().unwrap_or(0);
    for line in lines {
        if line.extra.is_empty() {
            println!(
                "{:<label_width$} {:>value_width$}",
                line.label, line.value
            );
        } else {
            println!(
                "{:<label_width$} {:>value_width$} {}",
                line.label, line.value, line.extra
            );
        }
    }
}

/// One row of the file listing.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub size: String,
    pub hash: String,
    pub inode: String,
    pub date: String,
    pub links: String,
    pub path: String,
}

/// Print file rows with right-aligned numeric columns, path last.
///
/// The inode and link-count columns only appear when requested.
pub fn print_file_rows(rows: &[FileRow], show_inode_links: bool) {
    let width = |get: fn(&FileRow) -> &str| rows.iter().map(|r| get(r).len()).max().unwrap_or(0);
    let size_w = width(|r| &r.size);
    let hash_w = width(|r| &r.hash);
    let inode_w = width(|r| &r.inode);
    let date_w = width(|r| &r.date);
    let links_w = width(|r| &r.links);

    for row in rows {
        let mut line = format!("{:>size_w$} {:>hash_w$} ", row.size, row.hash);
        if show_inode_links {
            line.push_str(&format!("{:>inode_w$} ", row.inode));
        }
        line.push_str(&format!("{:>date_w$} ", row.date));
        if show_inode_links {
            line.push_str(&format!("{:>links_w$} ", row.links));
        }
        line.push_str(&row.path);
        println!("{line}");
    }
}

/// Unit used to label histogram bucket boundaries.
#[derive(Debug, Clone, Copy)]
pub struct HistogramUnit {
    pub factor: u64,
    pub label: &'static str,
}

/// Pick the boundary unit from the bucket width.
#[must_use]
pub fn histogram_unit(batch_size: u64) -> HistogramUnit {
    let mut index = 0;
    let mut size = batch_size;
    while size >= 1024 && index + 1 < UNITS.len() {
        size >>= 10;
        index += 1;
    }
    HistogramUnit {
        factor: 1u64 << (10 * index),
        label: UNITS[index],
    }
}
