use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::ffi::OsStr;
use std::io::Read;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Signals treated as a request to terminate.
const TERMINATION_SIGNALS: [i32; 3] = [SIGTERM, SIGINT, SIGHUP];

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long a child gets to exit on its own after this process received a
/// signal, before the signal is forwarded to it.
const FORWARD_GRACE: Duration = Duration::from_secs(1);
/// Pause after a child died by signal, so that asynchronous termination
/// messages (and the signal itself, if it was sent to the whole group) have
/// arrived before deciding what happened.
const SETTLE_DELAY: Duration = Duration::from_secs(1);
/// Exit codes above this are the shell convention for "killed by signal".
const SIGNAL_EXIT_THRESHOLD: i32 = 128;

/// Output of [`ProcessRunner::run_capturing_output`].
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    /// Interleaved stdout and stderr.
    pub output: String,
}
impl Captured {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Runs external programs to completion, one at a time.
///
/// Termination signals are captured for as long as the runner exists, so a
/// signal arriving between two children is not lost: the next call to
/// [`run`](Self::run) or [`run_capturing_output`](Self::run_capturing_output)
/// reports it instead of starting another child.
pub struct ProcessRunner {
    signals: Mutex<Signals>,
}
impl ProcessRunner {
    pub fn new() -> Result<Self> {
        let signals = Signals::new(TERMINATION_SIGNALS).or_raise(|| ErrorKind::SignalHandler)?;
        Ok(Self { signals: Mutex::new(signals) })
    }

    /// Runs `program` with inherited stdout/stderr and fails unless it exits
    /// with status zero.
    #[instrument(skip_all, fields(program = program))]
    pub fn run<I, S>(&self, program: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let command = self.command(program, args)?;
        let status = self.supervise(program, command)?;
        if status.success() {
            tracing::debug!("Command completed successfully");
            return Ok(());
        }
        if let Some(signal) = status.signal() {
            exn::bail!(ErrorKind::Signaled { command: program.to_string(), signal });
        }
        exn::bail!(ErrorKind::Failed {
            command: program.to_string(),
            exit_code: status.code().unwrap_or(-1),
        });
    }

    /// Runs `program` with stdout and stderr merged into a captured buffer.
    ///
    /// A non-zero exit is *not* an error; inspect [`Captured::status`].
    /// Termination signals are still reported as errors.
    #[instrument(skip_all, fields(program = program))]
    pub fn run_capturing_output<I, S>(&self, program: &str, args: I) -> Result<Captured>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (mut reader, writer) = std::io::pipe().or_raise(|| ErrorKind::Io)?;
        let mut command = self.command(program, args)?;
        command
            .stdin(Stdio::null())
            .stdout(writer.try_clone().or_raise(|| ErrorKind::Io)?)
            .stderr(writer);
        // Drain the pipe concurrently so a chatty child never blocks on a full buffer.
        let capture = thread::spawn(move || {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer).map(|_| buffer)
        });
        let status = self.supervise(program, command)?;
        let bytes = capture.join().map_err(|_| ErrorKind::Io)?.or_raise(|| ErrorKind::Io)?;
        let output = String::from_utf8_lossy(&bytes).into_owned();
        if !status.success() {
            tracing::debug!(status = %status, "Command exited unsuccessfully; output captured");
        }
        Ok(Captured { status, output })
    }

    fn command<I, S>(&self, program: &str, args: I) -> Result<Command>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let path = which::which(program).or_raise(|| ErrorKind::NotFound(program.to_string()))?;
        tracing::trace!(path = %path.display(), "Resolved executable");
        let mut command = Command::new(path);
        command.args(args);
        Ok(command)
    }

    /// Fails with [`ErrorKind::Terminated`] if a termination signal arrived
    /// while no child was running.
    ///
    /// Nobody else has reported such a signal, so `announce` is always set.
    pub fn check_terminated(&self) -> Result<()> {
        if let Some(signal) = self.pending_signal() {
            tracing::debug!(signal, "Termination signal received between commands");
            exn::bail!(ErrorKind::Terminated { signal, announce: true });
        }
        Ok(())
    }

    /// Returns the first termination signal received since the last check.
    fn pending_signal(&self) -> Option<i32> {
        let mut signals = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        signals.pending().next()
    }

    /// Spawns the command and blocks until the child has exited, honouring
    /// the termination contract described in the crate documentation.
    fn supervise(&self, program: &str, mut command: Command) -> Result<ExitStatus> {
        self.check_terminated()?;
        let mut child = command.spawn().or_raise(|| ErrorKind::Spawn(program.to_string()))?;
        // The command still holds our copies of any pipe ends handed to the
        // child; the capture reader only sees EOF once they are closed.
        drop(command);
        tracing::debug!(pid = child.id(), "Child process started");

        let mut received: Option<(i32, Instant)> = None;
        let mut forwarded = false;
        let status = loop {
            if let Some(status) = child.try_wait().or_raise(|| ErrorKind::Io)? {
                break status;
            }
            if received.is_none()
                && let Some(signal) = self.pending_signal()
            {
                tracing::debug!(signal, "Termination signal received; waiting for child to exit");
                received = Some((signal, Instant::now()));
            }
            if let Some((signal, at)) = received
                && !forwarded
                && at.elapsed() >= FORWARD_GRACE
            {
                tracing::info!(signal, pid = child.id(), "Child still running; forwarding termination signal");
                forward(&child, signal)?;
                forwarded = true;
            }
            thread::sleep(POLL_INTERVAL);
        };

        if exited_by_signal(&status) {
            thread::sleep(SETTLE_DELAY);
            if received.is_none() {
                received = self.pending_signal().map(|signal| (signal, Instant::now()));
            }
        }
        if let Some((signal, _)) = received {
            exn::bail!(ErrorKind::Terminated { signal, announce: forwarded });
        }
        Ok(status)
    }
}

fn forward(child: &Child, signal: i32) -> Result<()> {
    let sig = Signal::try_from(signal).or_raise(|| ErrorKind::Forward(signal))?;
    kill(Pid::from_raw(child.id() as i32), sig).or_raise(|| ErrorKind::Forward(signal))?;
    Ok(())
}

fn exited_by_signal(status: &ExitStatus) -> bool {
    status.signal().is_some() || status.code().is_some_and(|code| code > SIGNAL_EXIT_THRESHOLD)
}
