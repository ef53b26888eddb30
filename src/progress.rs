//! Rate-limited progress reporting.
//!
//! # Overview
//!
//! One summary line, refreshed at most once per second, showing files and
//! directories counted, bytes seen, the average hashing rate and the current
//! path (with a percentage while a single file is being hashed). Two output
//! modes:
//!
//! - **Redraw** (`--progress`): the line is redrawn in place via an
//!   [`indicatif`] spinner on stderr.
//! - **Lines** (`--progress --progress`): every update is a plain stderr
//!   line, suitable for log capture.
//!
//! The tracker is shared behind `&self` by every phase of a run; all state
//! lives in an internal mutex. No correctness depends on it.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::output::{format_compact_size, format_rate_mb};

/// How progress updates reach the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Redraw a single line in place (carriage-return style).
    Redraw,
    /// Emit a fresh line per update.
    Lines,
}

#[derive(Debug)]
struct ProgressState {
    dirs: u64,
    files: u64,
    bytes: u64,
    hashed_bytes: u64,
    current_dir: String,
    current_file: String,
    current_file_size: u64,
    current_file_done: u64,
    hashing: bool,
    last_print: Option<Instant>,
}

/// Shared progress tracker. See the module docs for behavior.
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
    bar: Option<ProgressBar>,
    mode: ProgressMode,
    max_width: usize,
    start: Instant,
}

impl ProgressTracker {
    /// Create a tracker with the given line width limit.
    #[must_use]
    pub fn new(mode: ProgressMode, max_width: usize) -> Self {
        let bar = match mode {
            ProgressMode::Redraw => {
                let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
                bar.set_style(ProgressStyle::with_template("{msg}").unwrap());
                Some(bar)
            }
            ProgressMode::Lines => None,
        };
        Self {
            state: Mutex::new(ProgressState {
                dirs: 0,
                files: 0,
                bytes: 0,
                hashed_bytes: 0,
                current_dir: String::new(),
                current_file: String::new(),
                current_file_size: 0,
                current_file_done: 0,
                hashing: false,
                last_print: None,
            }),
            bar,
            mode,
            max_width: max_width.max(16),
            start: Instant::now(),
        }
    }

    /// A directory scan or load is starting.
    pub fn on_dir_start(&self, dir: &Path) {
        let mut state = self.state.lock().unwrap();
        if !state.hashing {
            state.current_dir = dir.display().to_string();
        }
        self.tick(&mut state);
    }

    /// A directory has been fully processed.
    pub fn on_dir_done(&self) {
        let mut state = self.state.lock().unwrap();
        state.dirs += 1;
        self.tick(&mut state);
    }

    /// A whole directory was accounted from an existing catalog.
    pub fn add_dir_summary(&self, file_count: u64, total_bytes: u64) {
        let mut state = self.state.lock().unwrap();
        state.dirs += 1;
        state.files += file_count;
        state.bytes += total_bytes;
        self.tick(&mut state);
    }

    /// One file was enumerated (hashed or not).
    pub fn on_file_processed(&self, size: u64) {
        let mut state = self.state.lock().unwrap();
        state.files += 1;
        state.bytes += size;
        self.tick(&mut state);
    }

    /// Hashing of one file begins.
    pub fn on_hash_start(&self, file: &Path, file_size: u64) {
        let mut state = self.state.lock().unwrap();
        state.hashing = true;
        state.current_file = file.display().to_string();
        state.current_file_size = file_size;
        state.current_file_done = 0;
        self.tick(&mut state);
    }

    /// A chunk of the current file was hashed.
    pub fn on_hash_progress(&self, bytes_read: u64) {
        let mut state = self.state.lock().unwrap();
        state.hashed_bytes += bytes_read;
        state.current_file_done += bytes_read;
        self.tick(&mut state);
    }

    /// Hashing of the current file is done.
    pub fn on_hash_end(&self) {
        let mut state = self.state.lock().unwrap();
        state.hashing = false;
        state.current_file.clear();
        state.current_file_size = 0;
        state.current_file_done = 0;
        self.tick(&mut state);
    }

    /// Clear the in-place line so regular output starts clean.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    fn tick(&self, state: &mut ProgressState) {
        if let Some(last) = state.last_print {
            if last.elapsed().as_secs_f64() < 1.0 {
                return;
            }
        }
        state.last_print = Some(Instant::now());
        let line = self.render_line(state);
        match self.mode {
            ProgressMode::Redraw => {
                if let Some(bar) = &self.bar {
                    bar.set_message(line);
                }
            }
            ProgressMode::Lines => eprintln!("{line}"),
        }
    }

    fn render_line(&self, state: &ProgressState) -> String {
        let elapsed = self.start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            state.hashed_bytes as f64 / elapsed
        } else {
            0.0
        };
        let prefix = format!(
            "F:{} D:{} B:{} H:{}",
            state.files,
            state.dirs,
            format_compact_size(state.bytes),
            format_rate_mb(rate)
        );

        let suffix = if state.hashing && !state.current_file.is_empty() {
            let percent = if state.current_file_size > 0 {
                state.current_file_done * 100 / state.current_file_size
            } else {
                0
            };
            let percent_str = format!("{percent}%");
            let room = self.available_path_len(prefix.len(), percent_str.len());
            format!("{percent_str} {}", abbreviate_path(&state.current_file, room))
        } else if !state.current_dir.is_empty() {
            let room = self.available_path_len(prefix.len(), 0);
            abbreviate_path(&state.current_dir, room)
        } else {
            String::new()
        };

        let mut line = prefix;
        if !suffix.is_empty() {
            line.push(' ');
            line.push_str(&suffix);
        }
        if line.len() > self.max_width {
            line.truncate(self.max_width);
        }
        line
    }

    fn available_path_len(&self, prefix_len: usize, extra_len: usize) -> usize {
        let mut used = prefix_len + 1;
        if extra_len > 0 {
            used += extra_len + 1;
        }
        self.max_width.saturating_sub(used)
    }
}

/// Keep the tail of a long path, marking the cut with `...`.
fn abbreviate_path(path: &str, max_len: usize) -> String {
    if max_len == 0 {
        return String::new();
    }
    if path.len() <= max_len {
        return path.to_string();
    }
    let tail = |keep: usize| {
        let mut cut = path.len() - keep;
        while !path.is_char_boundary(cut) {
            cut += 1;
        }
        &path[cut..]
    };
    if max_len <= 3 {
        return tail(max_len).to_string();
    }
    format!("...{}", tail(max_len - 3))
}
