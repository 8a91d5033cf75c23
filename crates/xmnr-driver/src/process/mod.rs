//! Supervision of the external test-driver process.
//!
//! [`DriverProcess::spawn`] starts the driver in its own process group with
//! one end of a Unix socket pair as both its stdin and stdout. The other end
//! is wrapped in a [`MessageChannel`] whose reads time out after the poll
//! interval, so every blocking step returns control to the caller within a
//! bounded time. Stderr is captured in an anonymous temporary file and read
//! back as diagnostic text once the driver has exited.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::abort::AbortFlag;
use crate::channel::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_MESSAGE_BYTES, MessageChannel, Received};
use crate::error::DriverError;

/// Tracing target for driver process supervision.
const PROCESS_TARGET: &str = "xmnr_driver::process";

/// Smallest poll interval accepted; a zero socket timeout means "block forever".
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Everything needed to start one driver run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    program: Utf8PathBuf,
    args: Vec<String>,
    working_dir: Utf8PathBuf,
    poll_interval: Duration,
    max_message_bytes: usize,
}

impl LaunchSpec {
    /// Creates a spec for `program` running in `working_dir`.
    #[must_use]
    pub fn new(program: impl Into<Utf8PathBuf>, working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            poll_interval: Duration::from_millis(100),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Appends arguments to the driver's argument vector.
    #[must_use]
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the interval between abort checks.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Sets the largest message accepted from the driver.
    #[must_use]
    pub const fn with_max_message_bytes(mut self, limit: usize) -> Self {
        self.max_message_bytes = limit;
        self
    }

    /// Driver program.
    #[must_use]
    pub fn program(&self) -> &Utf8Path {
        self.program.as_path()
    }

    /// Driver arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Working directory of the driver.
    #[must_use]
    pub fn working_dir(&self) -> &Utf8Path {
        self.working_dir.as_path()
    }

    /// Interval between abort checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// How a wait on the driver ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The driver exited on its own.
    Exited(ExitStatus),
    /// An abort was requested before the driver exited.
    Aborted,
}

/// A running (or reaped) test-driver process and its message channel.
pub struct DriverProcess {
    child: Child,
    channel: Option<MessageChannel<UnixStream>>,
    stderr: File,
    status: Option<ExitStatus>,
    poll_interval: Duration,
}

impl DriverProcess {
    /// Starts the driver described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::BinaryNotFound`] when the program does not
    /// exist, [`DriverError::Spawn`] for other start failures, and
    /// [`DriverError::Io`] when the socket pair or capture file cannot be
    /// prepared.
    pub fn spawn(spec: &LaunchSpec) -> Result<Self, DriverError> {
        let (parent, child_end) =
            UnixStream::pair().map_err(|error| DriverError::io("create driver socket", error))?;
        let child_stdout = child_end
            .try_clone()
            .map_err(|error| DriverError::io("duplicate driver socket", error))?;
        let stderr = tempfile::tempfile()
            .map_err(|error| DriverError::io("create driver stderr capture", error))?;
        let child_stderr = stderr
            .try_clone()
            .map_err(|error| DriverError::io("duplicate driver stderr capture", error))?;

        debug!(
            target: PROCESS_TARGET,
            program = %spec.program,
            args = ?spec.args,
            working_dir = %spec.working_dir,
            "spawning test driver"
        );

        let mut command = Command::new(spec.program.as_std_path());
        command
            .args(&spec.args)
            .current_dir(spec.working_dir.as_std_path())
            .stdin(Stdio::from(OwnedFd::from(child_end)))
            .stdout(Stdio::from(OwnedFd::from(child_stdout)))
            .stderr(Stdio::from(child_stderr))
            .process_group(0);

        let spawned = command.spawn();
        // Closes the parent's copies of the child's descriptors so the
        // channel sees end-of-stream when the driver exits.
        drop(command);
        let child = spawned.map_err(|error| spawn_error(&spec.program, error))?;

        parent
            .set_read_timeout(Some(spec.poll_interval))
            .map_err(|error| DriverError::io("configure driver socket", error))?;

        info!(
            target: PROCESS_TARGET,
            program = %spec.program,
            pid = child.id(),
            "test driver started"
        );

        Ok(Self {
            child,
            channel: Some(MessageChannel::with_limits(
                parent,
                DEFAULT_CHUNK_SIZE,
                spec.max_message_bytes,
            )),
            stderr,
            status: None,
            poll_interval: spec.poll_interval,
        })
    }

    /// Operating-system process identifier.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Exit status, once the driver has been reaped.
    #[must_use]
    pub const fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Sends one message to the driver.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::ProcessReaped`] after the driver was reaped,
    /// or any error from [`MessageChannel::send`].
    pub fn send<T: Serialize>(&mut self, message: &T) -> Result<(), DriverError> {
        self.live_channel()?.send(message)
    }

    /// Receives the next message from the driver.
    ///
    /// Blocks for at most one poll interval.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::ProcessReaped`] after the driver was reaped,
    /// or any error from [`MessageChannel::receive`].
    pub fn receive<T: DeserializeOwned>(&mut self) -> Result<Received<T>, DriverError> {
        self.live_channel()?.receive()
    }

    /// Drops buffered, undelivered driver output.
    pub fn discard_pending(&mut self) -> usize {
        self.channel
            .as_mut()
            .map_or(0, MessageChannel::discard_pending)
    }

    fn live_channel(&mut self) -> Result<&mut MessageChannel<UnixStream>, DriverError> {
        if self.status.is_some() {
            return Err(DriverError::ProcessReaped);
        }
        self.channel.as_mut().ok_or(DriverError::ProcessReaped)
    }

    /// Checks for exit without blocking, reaping the driver if it exited.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] if the status cannot be queried.
    pub fn try_status(&mut self) -> Result<Option<ExitStatus>, DriverError> {
        if self.status.is_some() {
            return Ok(self.status);
        }
        let polled = self
            .child
            .try_wait()
            .map_err(|error| DriverError::io("query driver status", error))?;
        if let Some(status) = polled {
            self.record_exit(status);
        }
        Ok(polled)
    }

    /// Waits for the driver to exit, checking `abort` every poll interval.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] if the status cannot be queried.
    pub fn wait(&mut self, abort: &AbortFlag) -> Result<ExitOutcome, DriverError> {
        loop {
            if let Some(status) = self.try_status()? {
                return Ok(ExitOutcome::Exited(status));
            }
            if abort.is_requested() {
                debug!(target: PROCESS_TARGET, pid = self.id(), "abort observed while waiting");
                return Ok(ExitOutcome::Aborted);
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Stops the driver and reaps it.
    ///
    /// Sends `SIGTERM` to the driver's process group, waits up to `grace`
    /// for it to exit, then sends `SIGKILL`. Calling this after the driver
    /// has exited is a no-op that returns the recorded status.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] if the driver cannot be signalled or
    /// reaped.
    pub fn terminate(&mut self, grace: Duration) -> Result<ExitStatus, DriverError> {
        if let Some(status) = self.try_status()? {
            return Ok(status);
        }

        info!(target: PROCESS_TARGET, pid = self.id(), "terminating test driver");
        self.signal_group(Signal::SIGTERM)?;

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(status) = self.try_status()? {
                return Ok(status);
            }
            thread::sleep(self.poll_interval.min(grace));
        }

        warn!(
            target: PROCESS_TARGET,
            pid = self.id(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "test driver ignored SIGTERM, killing"
        );
        self.signal_group(Signal::SIGKILL)?;
        let status = self
            .child
            .wait()
            .map_err(|error| DriverError::io("reap driver", error))?;
        self.record_exit(status);
        Ok(status)
    }

    /// Reads back everything the driver wrote to stderr.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] if the capture file cannot be read.
    pub fn stderr_output(&mut self) -> Result<String, DriverError> {
        let mut captured = Vec::new();
        self.stderr
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.stderr.read_to_end(&mut captured))
            .map_err(|error| DriverError::io("read driver stderr", error))?;
        Ok(String::from_utf8_lossy(&captured).into_owned())
    }

    fn signal_group(&mut self, signal: Signal) -> Result<(), DriverError> {
        let raw = i32::try_from(self.child.id()).map_err(|_| {
            DriverError::io(
                "signal driver",
                io::Error::other("process id out of range"),
            )
        })?;
        match killpg(Pid::from_raw(raw), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid = raw,
                    signal = signal.as_str(),
                    error = %errno,
                    "failed to signal driver process group, signalling driver directly"
                );
                self.child
                    .kill()
                    .map_err(|error| DriverError::io("signal driver", error))
            }
        }
    }

    fn record_exit(&mut self, status: ExitStatus) {
        info!(
            target: PROCESS_TARGET,
            pid = self.child.id(),
            code = status.code(),
            signal = status.signal(),
            "test driver exited"
        );
        self.status = Some(status);
        self.channel = None;
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        if self.status.is_some() {
            return;
        }
        if let Err(error) = self.signal_group(Signal::SIGKILL) {
            warn!(
                target: PROCESS_TARGET,
                pid = self.child.id(),
                %error,
                "failed to kill test driver on drop"
            );
            return;
        }
        if let Err(error) = self.child.wait() {
            warn!(
                target: PROCESS_TARGET,
                pid = self.child.id(),
                %error,
                "failed to reap test driver on drop"
            );
        }
    }
}

impl std::fmt::Debug for DriverProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverProcess")
            .field("pid", &self.child.id())
            .field("status", &self.status)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

fn spawn_error(program: &Utf8Path, error: io::Error) -> DriverError {
    if error.kind() == io::ErrorKind::NotFound {
        DriverError::BinaryNotFound {
            program: program.to_string(),
            source: Arc::new(error),
        }
    } else {
        DriverError::Spawn {
            program: program.to_string(),
            source: Arc::new(error),
        }
    }
}

#[cfg(test)]
mod tests;
