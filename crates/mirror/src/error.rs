//! Mirror Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors from the other wikimirror
//! crates are kept as children in the error tree.

use derive_more::{Display, Error};
use std::path::PathBuf;
use wikimirror_locate::error::{Error as LocateError, ErrorKind as LocateErrorKind};
use wikimirror_process::error::{Error as ProcessError, ErrorKind as ProcessErrorKind};

/// A mirror error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing run mode or paths. Fix the configuration.
    #[display("configuration error")]
    Configuration,
    /// Index fetch or download transport failure.
    #[display("network error")]
    Network,
    /// The index lists no snapshot to initialize from.
    #[display("no snapshot published at {_0}")]
    SnapshotNotFound(#[error(not(source))] String),
    /// A freshly downloaded snapshot does not match its digest. Re-run.
    #[display("downloaded snapshot failed verification: {}", _0.display())]
    CorruptDownload(#[error(not(source))] PathBuf),
    /// A supervised external command failed.
    #[display("external command failed")]
    Execution,
    /// An external command is not installed.
    #[display("required tool not installed: {_0}")]
    ToolNotFound(#[error(not(source))] String),
    /// Deletion or working directory failure; the data directory may be contaminated.
    #[display("filesystem error")]
    Filesystem,
    /// The progress channel to the caller could not be used.
    #[display("progress channel error")]
    Progress,
    /// A termination signal stopped the run. See
    /// [`ErrorKind::Terminated`](wikimirror_process::error::ErrorKind::Terminated).
    #[display("interrupted by signal {signal}")]
    Interrupted { signal: i32, announce: bool },
}

impl ErrorKind {
    /// Raises a process error into the mirror error tree, keeping signal
    /// terminations and missing tools distinguishable; every other failure
    /// becomes `failure`.
    #[track_caller]
    pub fn process(err: ProcessError, failure: ErrorKind) -> Error {
        let kind = match &*err {
            ProcessErrorKind::Terminated { signal, announce } => Self::Interrupted { signal: *signal, announce: *announce },
            ProcessErrorKind::NotFound(program) => Self::ToolNotFound(program.clone()),
            _ => failure,
        };
        err.raise(kind)
    }

    #[track_caller]
    pub fn locate(err: LocateError) -> Error {
        let kind = match &*err {
            LocateErrorKind::NotFound(index) => Self::SnapshotNotFound(index.clone()),
            _ => Self::Network,
        };
        err.raise(kind)
    }

    /// The signal to re-raise before exiting, and whether the termination
    /// still has to be announced to the operator.
    pub fn termination(&self) -> Option<(i32, bool)> {
        match self {
            Self::Interrupted { signal, announce } => Some((*signal, *announce)),
            _ => None,
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::CorruptDownload(_) | Self::Execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_termination_is_preserved() {
        let err = exn::Exn::from(ProcessErrorKind::Terminated { signal: 15, announce: true });
        let err = ErrorKind::process(err, ErrorKind::Execution);
        assert_eq!(*err, ErrorKind::Interrupted { signal: 15, announce: true });
        assert_eq!(err.termination(), Some((15, true)));
    }

    #[test]
    fn test_process_failure_uses_fallback() {
        let err = exn::Exn::from(ProcessErrorKind::Failed { command: "wget".to_string(), exit_code: 8 });
        assert_eq!(*ErrorKind::process(err, ErrorKind::Network), ErrorKind::Network);
        let err = exn::Exn::from(ProcessErrorKind::NotFound("repo".to_string()));
        assert_eq!(*ErrorKind::process(err, ErrorKind::Execution), ErrorKind::ToolNotFound("repo".to_string()));
    }

    #[test]
    fn test_locate_not_found() {
        let err = exn::Exn::from(LocateErrorKind::NotFound("https://mirror.example.org/".to_string()));
        assert_eq!(*ErrorKind::locate(err), ErrorKind::SnapshotNotFound("https://mirror.example.org/".to_string()));
        let err = exn::Exn::from(LocateErrorKind::Network("https://mirror.example.org/".to_string()));
        assert_eq!(*ErrorKind::locate(err), ErrorKind::Network);
    }
}
