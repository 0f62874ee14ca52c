//! Extraction through the real process runner, with a stand-in `tar` first on
//! `PATH`. Own test binary: `PATH` is process-wide.

use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use wikimirror_mirror::{SystemTools, Toolchain};
use wikimirror_process::ProcessRunner;

const FAILING_TAR: &str = "#!/bin/sh\necho \"tar: wikipedia/broken: Cannot open: No such file or directory\" >&2\nexit 2\n";

#[test]
fn test_extract_tolerates_tar_errors() {
    let bin = tempfile::tempdir().unwrap();
    let tar = bin.path().join("tar");
    fs::write(&tar, FAILING_TAR).unwrap();
    fs::set_permissions(&tar, fs::Permissions::from_mode(0o755)).unwrap();
    let path = env::join_paths(std::iter::once(bin.path().to_path_buf()).chain(env::split_paths(
        &env::var_os("PATH").unwrap_or_default(),
    )))
    .unwrap();
    // SAFETY: this is the only test in this binary, so no other thread reads
    // the environment concurrently.
    unsafe { env::set_var("PATH", path) };

    let data = tempfile::tempdir().unwrap();
    let tools = SystemTools::new(ProcessRunner::new().unwrap());
    tools.extract(Path::new("/nonexistent/wikipedia-20240301.tar"), data.path()).unwrap();
}
