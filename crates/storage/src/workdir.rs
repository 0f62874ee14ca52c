//! Scoped changes of the process working directory.
//!
//! The working directory is process-wide state. Changing it is only done
//! through [`WorkingDirectory`], whose guard restores the previous directory
//! on every exit path, including early `?` returns and unwinding panics.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::env;
use std::path::{Path, PathBuf};

pub struct WorkingDirectory;

impl WorkingDirectory {
    /// Switches the process working directory to `path` until the returned
    /// guard is dropped.
    pub fn enter(path: impl AsRef<Path>) -> Result<WorkingDirectoryGuard> {
        let path = path.as_ref();
        let previous = env::current_dir().map_err(|e| ErrorKind::from_io(e, "."))?;
        env::set_current_dir(path).or_raise(|| ErrorKind::WorkingDirectory(path.to_path_buf()))?;
        tracing::debug!(from = %previous.display(), to = %path.display(), "Entered working directory");
        Ok(WorkingDirectoryGuard { previous })
    }

    /// Runs `f` with the working directory set to `path`.
    ///
    /// Errors from `f` are passed through untouched, after the previous
    /// directory has been restored.
    pub fn scoped<T, E>(path: impl AsRef<Path>, f: impl FnOnce() -> std::result::Result<T, E>) -> Result<std::result::Result<T, E>> {
        let _guard = Self::enter(path)?;
        Ok(f())
    }
}

/// Restores the previous working directory when dropped.
#[must_use = "the previous working directory is restored as soon as the guard is dropped"]
pub struct WorkingDirectoryGuard {
    previous: PathBuf,
}
impl Drop for WorkingDirectoryGuard {
    fn drop(&mut self) {
        match env::set_current_dir(&self.previous) {
            Ok(()) => tracing::debug!(to = %self.previous.display(), "Restored working directory"),
            Err(e) => tracing::error!(error = %e, to = %self.previous.display(), "Unable to restore working directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The working directory is shared by every test thread in this binary.
    static CWD: Mutex<()> = Mutex::new(());

    fn canonical(path: &Path) -> PathBuf {
        path.canonicalize().unwrap()
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let _lock = CWD.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = tempfile::tempdir().unwrap();
        let before = env::current_dir().unwrap();
        {
            let _guard = WorkingDirectory::enter(temp_dir.path()).unwrap();
            assert_eq!(canonical(&env::current_dir().unwrap()), canonical(temp_dir.path()));
        }
        assert_eq!(env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_scoped_restores_on_error() {
        let _lock = CWD.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = tempfile::tempdir().unwrap();
        let before = env::current_dir().unwrap();
        let result = WorkingDirectory::scoped(temp_dir.path(), || {
            assert_eq!(canonical(&env::current_dir().unwrap()), canonical(temp_dir.path()));
            Err::<(), _>("sync failed")
        })
        .unwrap();
        assert_eq!(result, Err("sync failed"));
        assert_eq!(env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_scoped_restores_on_panic() {
        let _lock = CWD.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = tempfile::tempdir().unwrap();
        let before = env::current_dir().unwrap();
        let path = temp_dir.path().to_path_buf();
        let outcome = std::panic::catch_unwind(move || {
            let _ = WorkingDirectory::scoped(&path, || -> std::result::Result<(), ()> { panic!("boom") });
        });
        assert!(outcome.is_err());
        assert_eq!(env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_enter_missing_directory() {
        let _lock = CWD.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = tempfile::tempdir().unwrap();
        let before = env::current_dir().unwrap();
        let Err(err) = WorkingDirectory::enter(temp_dir.path().join("missing")) else {
            panic!("expected error");
        };
        assert!(matches!(&*err, ErrorKind::WorkingDirectory(_)));
        assert_eq!(env::current_dir().unwrap(), before);
    }
}
