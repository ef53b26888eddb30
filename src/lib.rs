//! dirdb - operations on huge directory trees.
//!
//! Maintains a compact binary catalog (`.dirdb`) in every directory,
//! recording a SHA-3 content fingerprint and stat attributes per regular
//! file. On top of the catalogs it answers cross-tree content-identity
//! questions (statistics, redundancy, size histograms, N-way intersection)
//! and can delete or hardlink duplicate content.

pub mod catalog;
pub mod cli;
pub mod error;
pub mod hasher;
pub mod index;
pub mod logging;
pub mod ops;
pub mod output;
pub mod paths;
pub mod progress;
pub mod walker;
