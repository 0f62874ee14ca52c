//! Process Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A process supervision error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for process operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The executable could not be found in `PATH` (or at the given path).
    #[display("command not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The executable was found but the operating system refused to start it.
    #[display("failed to start command: {_0}")]
    Spawn(#[error(not(source))] String),
    /// The child exited normally with a non-zero status.
    #[display("{command} exited with code {exit_code}")]
    Failed { command: String, exit_code: i32 },
    /// The child was killed by a signal that this process never received.
    #[display("{command} was killed by signal {signal}")]
    Signaled { command: String, signal: i32 },
    /// This process received a termination signal. The caller should unwind
    /// and terminate itself with the same signal.
    ///
    /// `announce` is `true` when the signal was delivered to this process
    /// alone and had to be forwarded to the child, meaning nobody has told the
    /// operator about the termination yet.
    #[display("terminated by signal {signal}")]
    Terminated { signal: i32, announce: bool },
    /// Forwarding a termination signal to the child failed.
    #[display("unable to forward signal {_0} to child process")]
    Forward(#[error(not(source))] i32),
    #[display("unable to install termination signal handlers")]
    SignalHandler,
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Signaled { .. })
    }
}
