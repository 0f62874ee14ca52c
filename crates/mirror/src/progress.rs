//! Progress reporting to the caller's control endpoint.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use std::io::Write;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

/// Receives progress checkpoints, as a percentage.
pub trait Progress {
    fn progress_changed(&mut self, percent: u8) -> Result<()>;
}

/// Connects to the control endpoint if one is configured, otherwise only logs.
///
/// Call this before doing any other work: the connection is held for the
/// whole run and closed when the returned value is dropped.
pub fn connect(socket: Option<&Path>) -> Result<Box<dyn Progress>> {
    match socket {
        Some(path) => Ok(Box::new(ControlSocket::connect(path)?)),
        None => Ok(Box::new(LogOnly)),
    }
}

/// Progress that goes nowhere but the log.
#[derive(Debug, Default)]
pub struct LogOnly;
impl Progress for LogOnly {
    fn progress_changed(&mut self, percent: u8) -> Result<()> {
        tracing::info!(percent, "Progress changed");
        Ok(())
    }
}

#[derive(Serialize)]
struct Message {
    message: &'static str,
    data: ProgressData,
}

#[derive(Serialize)]
struct ProgressData {
    progress: u8,
}

/// Newline-delimited JSON messages over a Unix socket.
#[derive(Debug)]
pub struct ControlSocket {
    path: PathBuf,
    stream: UnixStream,
}
impl ControlSocket {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path).or_raise(|| ErrorKind::Progress)?;
        tracing::debug!(socket = %path.display(), "Connected to control endpoint");
        Ok(Self { path, stream })
    }
}
impl Progress for ControlSocket {
    fn progress_changed(&mut self, percent: u8) -> Result<()> {
        let message = Message { message: "progress", data: ProgressData { progress: percent } };
        serde_json::to_writer(&mut self.stream, &message).or_raise(|| ErrorKind::Progress)?;
        self.stream.write_all(b"\n").or_raise(|| ErrorKind::Progress)?;
        self.stream.flush().or_raise(|| ErrorKind::Progress)?;
        tracing::info!(percent, "Progress changed");
        Ok(())
    }
}
impl Drop for ControlSocket {
    fn drop(&mut self) {
        // The peer may already be gone; nothing useful to do about it now.
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            tracing::debug!(error = %e, socket = %self.path.display(), "Control endpoint already closed");
        }
    }
}

/// Forwards checkpoints while keeping them within `0..=100` and never
/// decreasing within a run.
pub struct Checkpoints<'a> {
    inner: &'a mut dyn Progress,
    last: Option<u8>,
}
impl<'a> Checkpoints<'a> {
    pub const COMPLETE: u8 = 100;

    pub fn new(inner: &'a mut dyn Progress) -> Self {
        Self { inner, last: None }
    }

    pub fn report(&mut self, percent: u8) -> Result<()> {
        let percent = percent.min(Self::COMPLETE);
        if let Some(last) = self.last
            && percent < last
        {
            tracing::warn!(percent, last, "Ignoring progress checkpoint lower than the last one reported");
            return Ok(());
        }
        self.inner.progress_changed(percent)?;
        self.last = Some(percent);
        Ok(())
    }
}
