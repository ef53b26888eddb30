//! Crate-wide error type and result alias.
//!
//! Every fallible operation in the library funnels into [`DirdbError`]. The
//! binary prints the error through a single sink in `main` and exits
//! non-zero; recursive-walk problems (permission denied, vanished entries)
//! are logged and skipped at the walk site instead of being raised here.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors surfaced by catalog, aggregation and mutation operations.
#[derive(Debug, Error)]
pub enum DirdbError {
    /// Invalid command line: bad flag combination, missing argument,
    /// non-existent or non-directory path.
    #[error("{0}")]
    Usage(String),

    /// Malformed sidecar file: bad tag, unknown version, truncated section,
    /// out-of-range offset or inconsistent table of contents.
    #[error("invalid catalog {path}: {detail}")]
    Codec { path: PathBuf, detail: String },

    /// Read/write/stat/remove/rename/link failure.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Hashing failure: unreadable file mid-stream or a short digest.
    #[error("hash error for {path}: {detail}")]
    Hash { path: PathBuf, detail: String },

    /// A destination that must be free is occupied: extract target exists,
    /// or no free temporary name for hardlink replacement.
    #[error("{detail}: {path}")]
    Conflict { path: PathBuf, detail: String },
}

impl DirdbError {
    /// Attach a path to a raw I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a codec error for the given sidecar path.
    pub fn codec(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Codec {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// The path this error is about, if it carries one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Usage(_) => None,
            Self::Codec { path, .. }
            | Self::Io { path, .. }
            | Self::Hash { path, .. }
            | Self::Conflict { path, .. } => Some(path),
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, DirdbError>;
