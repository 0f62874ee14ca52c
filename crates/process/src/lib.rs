//! Supervision of external programs.
//!
//! Every child process started by wikimirror goes through [`ProcessRunner`],
//! which keeps the termination contract in one place:
//!
//! - A termination signal sent to the whole process group reaches the child
//!   too. The child is expected to exit on its own and report its own
//!   termination, so the runner waits for it and stays quiet.
//! - A termination signal sent to this process alone is forwarded to the
//!   child after a short grace period. Once the child has exited the runner
//!   returns [`ErrorKind::Terminated`](crate::error::ErrorKind::Terminated)
//!   with `announce` set, and the caller is responsible for printing a
//!   message and re-raising the signal after its own cleanup.

pub mod error;
mod runner;

pub use crate::runner::{Captured, ProcessRunner};
