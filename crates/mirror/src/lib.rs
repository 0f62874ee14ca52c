//! Brings a data directory to a synced Wikipedia working tree.
//!
//! `init` runs start from a published snapshot archive (resuming from a
//! previously downloaded one when it still verifies), `update` runs only sync
//! an already initialized tree. See [`machine`] for the states involved.

pub mod error;
pub mod machine;
pub mod progress;
pub mod tools;

pub use crate::machine::{LocalSnapshot, Mirror, Report, State};
pub use crate::progress::{Checkpoints, ControlSocket, LogOnly, Progress};
pub use crate::tools::{SystemTools, Toolchain};

use crate::error::{ErrorKind, Result};
use tracing::instrument;
use wikimirror_config::Config;
use wikimirror_locate::SnapshotLocator;
use wikimirror_process::ProcessRunner;

/// Runs the mirror against the real system tools and snapshot index.
///
/// The progress channel is connected before anything else happens, so a
/// missing control endpoint fails the run without touching the data directory.
#[instrument(skip_all)]
pub fn run(config: &Config) -> Result<Report> {
    let mut progress = progress::connect(config.control_socket.as_deref())?;
    let runner = ProcessRunner::new().map_err(|e| e.raise(ErrorKind::Execution))?;
    let tools = SystemTools::new(runner);
    let locator = SnapshotLocator::new(config.snapshot.timeout()).map_err(|e| e.raise(ErrorKind::Network))?;
    let report = Mirror::new(config, &tools, &locator).run(progress.as_mut())?;
    tracing::info!(mode = %report.mode, snapshot = ?report.snapshot, resumed = report.resumed, "Mirror run complete");
    Ok(report)
}
