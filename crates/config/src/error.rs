//! Configuration Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// None of these are retryable: the configuration has to be fixed first.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The merged configuration could not be deserialized (missing keys,
    /// unknown run mode, wrong types).
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// The data directory must be an absolute path.
    #[display("data directory must be an absolute path: {}", _0.display())]
    RelativeDataDirectory(#[error(not(source))] PathBuf),
    /// The dump mirror directory must be an absolute path.
    #[display("dumps directory must be an absolute path: {}", _0.display())]
    RelativeDumpsDirectory(#[error(not(source))] PathBuf),
    /// Mirroring dumps into the data directory (or one of its ancestors) would
    /// have rsync delete the working tree, and INIT purge the dumps.
    #[display("dumps directory must not contain the data directory: {}", _0.display())]
    DumpsDirectoryOverlap(#[error(not(source))] PathBuf),
    /// An explicitly requested configuration file does not exist.
    #[display("configuration file not found: {}", _0.display())]
    FileNotFound(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
