//! The mirror synchronization state machine.
//!
//! ```text
//! SelectMode -> MirrorDumps -+-> ReuseOrPurge -> AcquireSnapshot -> ExtractSnapshot -> SyncRepo -> Cleanup -> Done   (init)
//!                            +-> SyncRepo -> Done                                                                    (update)
//! ```
//!
//! Every state leaves the data directory recoverable: before a verified
//! snapshot is in hand it only ever holds a snapshot/digest pair (which the
//! next run re-verifies) or nothing, and the snapshot is only deleted once the
//! extracted tree has been synced.

use crate::error::{ErrorKind, Result};
use crate::progress::{Checkpoints, Progress};
use crate::tools::Toolchain;
use derive_more::Display;
use exn::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;
use wikimirror_config::{Config, RunMode};
use wikimirror_locate::{DIGEST_SUFFIX, Locate};
use wikimirror_storage::{WorkingDirectory, reconcile, verify};

const ARCHIVE_EXTENSION: &str = ".tar";

/// Progress checkpoints reported during initialization.
mod checkpoint {
    pub(super) const DIGEST_DOWNLOADED: u8 = 5;
    pub(super) const SNAPSHOT_VERIFIED: u8 = 50;
    pub(super) const SNAPSHOT_EXTRACTED: u8 = 60;
    pub(super) const REPO_SYNCED: u8 = 99;
    pub(super) const DONE: u8 = 100;
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum State {
    SelectMode,
    MirrorDumps,
    ReuseOrPurge,
    AcquireSnapshot,
    ExtractSnapshot,
    SyncRepo,
    Cleanup,
    Done,
}

/// A snapshot archive and its digest file inside the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub name: String,
    pub archive: PathBuf,
    pub digest: PathBuf,
}
impl LocalSnapshot {
    fn new(dir: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            archive: dir.join(&name),
            digest: dir.join(format!("{name}{DIGEST_SUFFIX}")),
            name,
        }
    }

    fn paths(&self) -> [PathBuf; 2] {
        [self.archive.clone(), self.digest.clone()]
    }
}

/// States carrying the data they need, so a state can only be reached with
/// its inputs in hand.
enum Step {
    SelectMode,
    MirrorDumps,
    ReuseOrPurge,
    AcquireSnapshot(Option<LocalSnapshot>),
    ExtractSnapshot(LocalSnapshot),
    SyncRepo(Option<LocalSnapshot>),
    Cleanup(LocalSnapshot),
    Done,
}
impl Step {
    fn state(&self) -> State {
        match self {
            Self::SelectMode => State::SelectMode,
            Self::MirrorDumps => State::MirrorDumps,
            Self::ReuseOrPurge => State::ReuseOrPurge,
            Self::AcquireSnapshot(_) => State::AcquireSnapshot,
            Self::ExtractSnapshot(_) => State::ExtractSnapshot,
            Self::SyncRepo(_) => State::SyncRepo,
            Self::Cleanup(_) => State::Cleanup,
            Self::Done => State::Done,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub mode: RunMode,
    /// State the run stopped in; always [`State::Done`] on success.
    pub state: State,
    /// Name of the snapshot the tree was initialized from (init only).
    pub snapshot: Option<String>,
    /// Whether a previously downloaded snapshot was reused.
    pub resumed: bool,
}

pub struct Mirror<'a> {
    config: &'a Config,
    tools: &'a dyn Toolchain,
    locator: &'a dyn Locate,
}
impl<'a> Mirror<'a> {
    pub fn new(config: &'a Config, tools: &'a dyn Toolchain, locator: &'a dyn Locate) -> Self {
        Self { config, tools, locator }
    }

    fn data_directory(&self) -> &Path {
        self.config.data_directory()
    }

    /// Drives the state machine from `SelectMode` to `Done`.
    ///
    /// Any error aborts the run where it happened; the data directory is left
    /// as the last completed state produced it. A termination signal received
    /// between states aborts the run before the next one, `Done` included.
    #[instrument(skip_all, fields(mode = %self.config.run_mode, data_directory = %self.data_directory().display()))]
    pub fn run(&self, progress: &mut dyn Progress) -> Result<Report> {
        let mut checkpoints = Checkpoints::new(progress);
        let mode = self.config.run_mode;
        let mut report = Report { mode, state: State::SelectMode, snapshot: None, resumed: false };
        let mut step = Step::SelectMode;
        loop {
            // Signals that arrive outside a child process are acted on here.
            self.tools.check_terminated()?;
            tracing::info!(state = %step.state(), "Entering state");
            step = match step {
                // The mode was validated when the configuration was parsed.
                Step::SelectMode => Step::MirrorDumps,
                Step::MirrorDumps => {
                    self.mirror_dumps()?;
                    match mode {
                        RunMode::Init => Step::ReuseOrPurge,
                        RunMode::Update => Step::SyncRepo(None),
                    }
                },
                Step::ReuseOrPurge => Step::AcquireSnapshot(self.reuse_or_purge()?),
                Step::AcquireSnapshot(retained) => {
                    let (snapshot, resumed) = self.acquire_snapshot(retained, &mut checkpoints)?;
                    checkpoints.report(checkpoint::SNAPSHOT_VERIFIED)?;
                    report.snapshot = Some(snapshot.name.clone());
                    report.resumed = resumed;
                    Step::ExtractSnapshot(snapshot)
                },
                Step::ExtractSnapshot(snapshot) => {
                    self.tools.extract(&snapshot.archive, self.data_directory())?;
                    checkpoints.report(checkpoint::SNAPSHOT_EXTRACTED)?;
                    Step::SyncRepo(Some(snapshot))
                },
                Step::SyncRepo(snapshot) => {
                    self.sync_repo()?;
                    match snapshot {
                        Some(snapshot) => {
                            checkpoints.report(checkpoint::REPO_SYNCED)?;
                            Step::Cleanup(snapshot)
                        },
                        None => Step::Done,
                    }
                },
                Step::Cleanup(snapshot) => {
                    self.cleanup(&snapshot)?;
                    checkpoints.report(checkpoint::DONE)?;
                    Step::Done
                },
                Step::Done => break,
            };
        }
        report.state = State::Done;
        Ok(report)
    }

    /// Optional pre-stage: rsync the raw dumps. Importing them anywhere is not
    /// implemented.
    fn mirror_dumps(&self) -> Result<()> {
        let Some((source, destination)) = self.config.dumps() else {
            tracing::debug!("Dump mirror not configured; skipping");
            return Ok(());
        };
        fs::create_dir_all(&destination).or_raise(|| ErrorKind::Filesystem)?;
        self.tools.mirror_dumps(source, &destination)
    }

    /// Entries of the data directory that survive every purge: the top-level
    /// ancestor of the dump mirror, when it lives inside the data directory.
    fn always_kept(&self) -> Vec<PathBuf> {
        let Some((_, dumps)) = self.config.dumps() else {
            return Vec::new();
        };
        dumps
            .strip_prefix(self.data_directory())
            .ok()
            .and_then(|relative| relative.components().next())
            .map(|top| vec![self.data_directory().join(top)])
            .unwrap_or_default()
    }

    /// Keeps the newest snapshot/digest pair (if any) and purges everything else.
    #[instrument(skip(self))]
    fn reuse_or_purge(&self) -> Result<Option<LocalSnapshot>> {
        let dir = self.data_directory();
        fs::create_dir_all(dir).or_raise(|| ErrorKind::Filesystem)?;
        let retained = find_retained(dir)?;
        let mut keep = self.always_kept();
        match &retained {
            Some(snapshot) => {
                tracing::info!(snapshot = %snapshot.name, "Found previously downloaded snapshot; keeping it for verification");
                keep.extend(snapshot.paths());
            },
            None => tracing::info!("No previous snapshot found; wiping data directory"),
        }
        reconcile(dir, &keep).map_err(|e| e.raise(ErrorKind::Filesystem))?;
        Ok(retained)
    }

    /// Returns a verified snapshot and whether it was reused from a previous run.
    #[instrument(skip_all)]
    fn acquire_snapshot(
        &self,
        retained: Option<LocalSnapshot>,
        checkpoints: &mut Checkpoints<'_>,
    ) -> Result<(LocalSnapshot, bool)> {
        if let Some(snapshot) = retained {
            if verify(&snapshot.archive, &snapshot.digest) {
                tracing::info!(snapshot = %snapshot.name, "Previously downloaded snapshot verified; skipping download");
                return Ok((snapshot, true));
            }
            tracing::warn!(snapshot = %snapshot.name, "Previously downloaded snapshot failed verification; downloading again");
        }
        let dir = self.data_directory();
        reconcile(dir, &self.always_kept()).map_err(|e| e.raise(ErrorKind::Filesystem))?;

        let candidate = self.locator.locate(&self.config.snapshot.index_url).map_err(ErrorKind::locate)?;
        let snapshot = LocalSnapshot::new(dir, &candidate.name);
        self.tools.download(&candidate.digest_url, &snapshot.digest)?;
        checkpoints.report(checkpoint::DIGEST_DOWNLOADED)?;
        self.tools.download(&candidate.data_url, &snapshot.archive)?;
        if !verify(&snapshot.archive, &snapshot.digest) {
            exn::bail!(ErrorKind::CorruptDownload(snapshot.archive));
        }
        tracing::info!(snapshot = %snapshot.name, "Snapshot downloaded and verified");
        Ok((snapshot, false))
    }

    fn sync_repo(&self) -> Result<()> {
        WorkingDirectory::scoped(self.data_directory(), || self.tools.sync_repo())
            .map_err(|e| e.raise(ErrorKind::Filesystem))?
    }

    fn cleanup(&self, snapshot: &LocalSnapshot) -> Result<()> {
        for path in snapshot.paths() {
            fs::remove_file(&path).or_raise(|| ErrorKind::Filesystem)?;
            tracing::debug!(path = %path.display(), "Removed");
        }
        Ok(())
    }
}

/// Finds the newest `*.tar` in `dir` that has a `*.tar.md5` next to it.
fn find_retained(dir: &Path) -> Result<Option<LocalSnapshot>> {
    let mut newest: Option<String> = None;
    for entry in fs::read_dir(dir).or_raise(|| ErrorKind::Filesystem)? {
        let entry = entry.or_raise(|| ErrorKind::Filesystem)?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(ARCHIVE_EXTENSION) || !entry.path().is_file() {
            continue;
        }
        if !dir.join(format!("{name}{DIGEST_SUFFIX}")).is_file() {
            tracing::debug!(snapshot = %name, "Ignoring snapshot without digest file");
            continue;
        }
        if newest.as_ref().is_none_or(|current| name > *current) {
            newest = Some(name);
        }
    }
    Ok(newest.map(|name| LocalSnapshot::new(dir, name)))
}
