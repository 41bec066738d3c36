//! Bounded external process execution.
//!
//! [`BoundedProcess`] starts a command under an overall wall-clock deadline,
//! exposes its stdout line by line and reports the exit outcome as a
//! [`ProcessError`] classification.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};

use crate::stream::LineStreamer;

/// Upper bound for draining stderr once the child is gone.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that can occur while running an external command.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The command exited unsuccessfully or was killed.
    #[error("command failed with {status}")]
    Failed { status: ExitStatus, stderr: String },

    /// The command exceeded its deadline and was killed.
    #[error("command timed out after {}s", .timeout.as_secs())]
    TimedOut { timeout: Duration, stderr: String },

    /// Spawning, reading or waiting failed at the OS level.
    #[error("process io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Whether this is a structured outcome of a command that did run.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Captured stderr, if the command ran.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Failed { stderr, .. } | Self::TimedOut { stderr, .. } => Some(stderr),
            Self::Io(_) => None,
        }
    }
}

/// A running command with an overall deadline.
///
/// The child is killed when the handle is dropped.
pub struct BoundedProcess {
    child: Child,
    stdout: Option<LineStreamer<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    timeout: Duration,
    deadline: Instant,
}

impl BoundedProcess {
    /// Start `program` with `args`; the deadline starts now.
    ///
    /// # Errors
    /// Returns `ProcessError::Io` if the command cannot be started.
    pub fn spawn(program: &str, args: &[String], timeout: Duration) -> Result<Self, ProcessError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().map(LineStreamer::new);
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        tracing::trace!(program, pid = ?child.id(), "Process started");

        Ok(Self {
            child,
            stdout,
            stderr,
            timeout,
            deadline: Instant::now() + timeout,
        })
    }

    /// Next stdout line.
    ///
    /// Returns `Ok(None)` at end of output and also once the deadline has
    /// passed; [`wait`](Self::wait) then reports the timeout.
    pub async fn next_line(&mut self) -> Result<Option<String>, ProcessError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        match timeout_at(self.deadline, stdout.next_line()).await {
            Ok(line) => Ok(line?),
            Err(_) => Ok(None),
        }
    }

    /// Send a kill signal without waiting for the child to exit.
    pub fn kill(&mut self) -> Result<(), ProcessError> {
        self.stdout = None;
        self.child.start_kill()?;
        Ok(())
    }

    /// Wait for the child to exit and classify the outcome.
    ///
    /// # Errors
    /// - `ProcessError::TimedOut` if the deadline passed first (the child is
    ///   killed)
    /// - `ProcessError::Failed` on a non-zero exit or a kill signal
    /// - `ProcessError::Io` if waiting failed
    pub async fn wait(mut self) -> Result<(), ProcessError> {
        let status = match timeout_at(self.deadline, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
                return Err(ProcessError::TimedOut {
                    timeout: self.timeout,
                    stderr: self.drain_stderr().await,
                });
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(ProcessError::Failed {
                status,
                stderr: self.drain_stderr().await,
            })
        }
    }

    async fn drain_stderr(&mut self) -> String {
        let Some(handle) = self.stderr.take() else {
            return String::new();
        };
        match timeout(STDERR_DRAIN_TIMEOUT, handle).await {
            Ok(Ok(stderr)) => stderr,
            _ => String::new(),
        }
    }
}

impl std::fmt::Debug for BoundedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedProcess")
            .field("pid", &self.child.id())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
