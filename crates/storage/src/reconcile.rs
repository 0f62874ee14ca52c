//! Purging stale entries from the data directory.

use crate::error::{ErrorKind, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Removes every entry directly under `dir` whose full path is not listed in
/// `keep`. An empty `keep` list wipes the directory.
///
/// Symbolic links are unlinked (never followed), regular files removed and
/// directories removed recursively. The first failure aborts the purge: the
/// directory must then be considered contaminated.
///
/// A missing `dir` is created, leaving nothing to purge.
#[instrument(skip(keep), fields(dir = %dir.as_ref().display(), keep = keep.len()))]
pub fn reconcile(dir: impl AsRef<Path>, keep: &[PathBuf]) -> Result<()> {
    let dir = dir.as_ref();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| ErrorKind::from_io(e, dir))?;
            return Ok(());
        },
        Err(e) => exn::bail!(ErrorKind::from_io(e, dir)),
    };
    let mut removed: usize = 0;
    for entry in entries {
        let entry = entry.map_err(|e| ErrorKind::from_io(e, dir))?;
        let path = entry.path();
        if keep.contains(&path) {
            tracing::debug!(path = %path.display(), "Keeping entry");
            continue;
        }
        remove(&path).map_err(|e| e.raise(ErrorKind::Remove(path.clone())))?;
        removed += 1;
    }
    tracing::info!(removed, "Data directory reconciled");
    Ok(())
}

fn remove(path: &Path) -> Result<()> {
    // symlink_metadata so that a link to a directory is unlinked, not descended.
    let file_type = fs::symlink_metadata(path).map_err(|e| ErrorKind::from_io(e, path))?.file_type();
    let result = if file_type.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    Ok(result.map_err(|e| ErrorKind::from_io(e, path))?)
}
