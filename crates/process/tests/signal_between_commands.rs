//! A signal that arrives after the last child exited must not be lost. Own
//! test binary: the signal is sent to the whole test process.

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::thread;
use std::time::Duration;
use wikimirror_process::ProcessRunner;
use wikimirror_process::error::ErrorKind;

#[test]
fn test_signal_after_last_command_is_reported() {
    let runner = ProcessRunner::new().unwrap();
    runner.run("sh", ["-c", "exit 0"]).unwrap();
    kill(Pid::this(), Signal::SIGTERM).unwrap();
    thread::sleep(Duration::from_millis(500));

    let err = runner.check_terminated().unwrap_err();
    assert_eq!(*err, ErrorKind::Terminated { signal: Signal::SIGTERM as i32, announce: true });
    // Reported once.
    runner.check_terminated().unwrap();
}
