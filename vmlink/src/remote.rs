//! Remote command execution and the graceful-shutdown helper.
//!
//! [`CommandRunner`] abstracts running one command over SSH. On top of it,
//! [`RemoteShutdown`] tracks a single in-guest shutdown command and
//! classifies its outcome. Shutdown commands rarely exit "successfully" -
//! the guest tears the connection down underneath them - so the
//! classification cares about what happened *before* the teardown.

use std::sync::Arc;

use crate::config::SshParams;

/// Event reported by a command runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    /// The remote process started.
    ProcessStarted,
    /// The remote process closed.
    ProcessClosed {
        /// The process exited normally with status zero.
        exit_ok: bool,
        stdout: String,
        stderr: String,
    },
    /// The connection failed; if the process had not started yet this is a
    /// connection error, otherwise it is the usual end of a shutdown command.
    ConnectionError { message: String },
}

/// Delivery handle for runner events, bound to one `run` invocation.
#[derive(Clone)]
pub struct RunnerSink {
    deliver: Arc<dyn Fn(RunnerEvent) + Send + Sync>,
}

impl RunnerSink {
    pub(crate) fn new(deliver: impl Fn(RunnerEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn process_started(&self) {
        (self.deliver)(RunnerEvent::ProcessStarted);
    }

    pub fn process_closed(&self, exit_ok: bool, stdout: String, stderr: String) {
        (self.deliver)(RunnerEvent::ProcessClosed {
            exit_ok,
            stdout,
            stderr,
        });
    }

    pub fn connection_error(&self, message: String) {
        (self.deliver)(RunnerEvent::ConnectionError { message });
    }
}

impl std::fmt::Debug for RunnerSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerSink").finish()
    }
}

/// Executes a single command on the remote host.
///
/// `run` is fire-and-forget; progress arrives through the sink. Each call is
/// independent - the controller never reuses a runner invocation.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str, params: &SshParams, sink: RunnerSink);
}

/// Outcome of a finished remote shutdown command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Could not connect to the guest at all.
    ConnectionError,
    /// Connected, but the command failed.
    ProcessError,
    Success,
}

/// Tracks one graceful-shutdown command from dispatch to classification.
///
/// Owned by the VM state machine for the duration of a soft close and dropped
/// on state exit. No retry logic lives here - escalation to a forced
/// power-off is the state machine's decision.
#[derive(Debug, Default)]
pub struct RemoteShutdown {
    connection_error: Option<String>,
    process_started: bool,
    process_closed: bool,
    exit_ok: bool,
    stdout: String,
    stderr: String,
    finished: bool,
}

impl RemoteShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a runner event. Returns `true` once the command is finished.
    pub fn apply(&mut self, event: RunnerEvent) -> bool {
        match event {
            RunnerEvent::ProcessStarted => {
                self.process_started = true;
            }
            RunnerEvent::ProcessClosed {
                exit_ok,
                stdout,
                stderr,
            } => {
                self.process_closed = true;
                self.exit_ok = exit_ok;
                self.stdout = stdout;
                self.stderr = stderr;
                self.finished = true;
            }
            RunnerEvent::ConnectionError { message } => {
                if !self.process_started {
                    self.connection_error = Some(message);
                }
                self.finished = true;
            }
        }
        self.finished
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_error(&self) -> bool {
        self.is_connection_error() || self.is_process_error()
    }

    /// The command never reached the guest.
    pub fn is_connection_error(&self) -> bool {
        self.finished && !self.process_started && self.connection_error.is_some()
    }

    /// The command ran but did not exit cleanly.
    pub fn is_process_error(&self) -> bool {
        self.finished && self.process_closed && !self.exit_ok
    }

    pub fn outcome(&self) -> Option<ShutdownOutcome> {
        if !self.finished {
            return None;
        }
        if self.is_connection_error() {
            Some(ShutdownOutcome::ConnectionError)
        } else if self.is_process_error() {
            Some(ShutdownOutcome::ProcessError)
        } else {
            Some(ShutdownOutcome::Success)
        }
    }

    pub fn connection_error_string(&self) -> Option<&str> {
        self.connection_error.as_deref()
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}
