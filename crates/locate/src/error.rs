//! Locator Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A locator error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for locator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The index URL (or a URL derived from it) is not a valid URL.
    #[display("invalid URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// The index page could not be fetched.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The index page was fetched but lists no snapshot.
    #[display("no snapshot found at {_0}")]
    NotFound(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A snapshot may be published later, so an empty index is worth another look.
        matches!(self, Self::Network(_) | Self::NotFound(_))
    }
}
