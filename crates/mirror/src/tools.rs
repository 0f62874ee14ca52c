//! External tools driven by the mirror.
//!
//! [`SystemTools`] is the only implementation that touches the outside world,
//! and it does so exclusively through [`ProcessRunner`].

use crate::error::{ErrorKind, Result};
use std::ffi::OsString;
use std::path::Path;
use tracing::instrument;
use wikimirror_locate::Url;
use wikimirror_process::ProcessRunner;

const RSYNC: &str = "rsync";
const WGET: &str = "wget";
const TAR: &str = "tar";
const REPO: &str = "repo";

/// One method per external tool.
pub trait Toolchain {
    /// Mirrors the raw dump tree with rsync.
    fn mirror_dumps(&self, source: &str, destination: &Path) -> Result<()>;
    /// Downloads `url` to `destination`, retrying inside the downloader.
    fn download(&self, url: &Url, destination: &Path) -> Result<()>;
    /// Unpacks `archive` into `destination`, dropping its top-level directory.
    /// Extraction errors are tolerated.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()>;
    /// Runs the repository sync in the current working directory.
    fn sync_repo(&self) -> Result<()>;
    /// Fails with [`ErrorKind::Interrupted`] if a termination signal arrived
    /// since the last tool exited.
    fn check_terminated(&self) -> Result<()>;
}

pub struct SystemTools {
    runner: ProcessRunner,
}
impl SystemTools {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }
}

impl Toolchain for SystemTools {
    #[instrument(skip(self), fields(destination = %destination.display()))]
    fn mirror_dumps(&self, source: &str, destination: &Path) -> Result<()> {
        self.runner
            .run(RSYNC, rsync_args(source, destination))
            .map_err(|e| ErrorKind::process(e, ErrorKind::Execution))
    }

    #[instrument(skip(self), fields(url = %url, destination = %destination.display()))]
    fn download(&self, url: &Url, destination: &Path) -> Result<()> {
        self.runner
            .run(WGET, wget_args(url, destination))
            .map_err(|e| ErrorKind::process(e, ErrorKind::Network))
    }

    #[instrument(skip(self), fields(archive = %archive.display()))]
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        let captured = self
            .runner
            .run_capturing_output(TAR, tar_args(archive, destination))
            .map_err(|e| ErrorKind::process(e, ErrorKind::Execution))?;
        if !captured.success() {
            // Archives this size routinely contain a handful of broken entries.
            tracing::warn!(status = %captured.status, output = %captured.output.trim_end(), "Extraction reported errors; continuing");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn sync_repo(&self) -> Result<()> {
        self.runner.run(REPO, ["sync"]).map_err(|e| ErrorKind::process(e, ErrorKind::Execution))
    }

    fn check_terminated(&self) -> Result<()> {
        self.runner.check_terminated().map_err(|e| ErrorKind::process(e, ErrorKind::Execution))
    }
}

pub(crate) fn rsync_args(source: &str, destination: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "-a", "-z", "-H", "--delete"].map(OsString::from).into();
    args.push(source.into());
    args.push(destination.into());
    args
}

/// Unlimited retries, 60 seconds apart (with jitter), 60 second timeout.
pub(crate) fn wget_args(url: &Url, destination: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-q",
        "--show-progress",
        "-t",
        "0",
        "-w",
        "60",
        "--random-wait",
        "-T",
        "60",
        "--passive-ftp",
        "-O",
    ]
    .map(OsString::from)
    .into();
    args.push(destination.into());
    args.push(url.as_str().into());
    args
}

pub(crate) fn tar_args(archive: &Path, destination: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-x", "--strip-components=1", "-C"].map(OsString::from).into();
    args.push(destination.into());
    args.push("-f".into());
    args.push(archive.into());
    args
}
