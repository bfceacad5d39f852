//! Static connection configuration.
//!
//! [`VmIdentity`] is an immutable value object naming the managed VM and the
//! SSH endpoint into it. Replacing the identity on a live controller resets
//! both state machines. Tunable intervals live in [`Timeouts`] so tests and
//! callers can shorten them without recompiling.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default in-guest command used for graceful shutdown.
pub const DEFAULT_SHUTDOWN_COMMAND: &str = "sdk-shutdown";

/// SSH authentication method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SshAuth {
    /// Password authentication.
    Password(String),
    /// Private key file authentication.
    KeyFile(std::path::PathBuf),
}

/// Parameters for the SSH channel into the VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    /// Overall connect timeout. Also acts as the boot grace window: while the
    /// VM has been running for less than this, recoverable connection errors
    /// are retried silently.
    pub connect_timeout: Duration,
}

/// Immutable identity of the managed virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmIdentity {
    /// VM name as known to the backend.
    pub name: String,
    /// Start the VM without a visible console.
    pub headless: bool,
    /// SSH endpoint parameters.
    pub ssh: SshParams,
    /// In-guest command run for a soft close.
    pub shutdown_command: String,
}

impl VmIdentity {
    /// Create an identity with the default shutdown command.
    pub fn new(name: impl Into<String>, headless: bool, ssh: SshParams) -> Self {
        Self {
            name: name.into(),
            headless,
            ssh,
            shutdown_command: DEFAULT_SHUTDOWN_COMMAND.to_string(),
        }
    }
}

/// Intervals and timeouts driving the state machines.
///
/// The defaults match well-tested values for VirtualBox-class backends; tests
/// shorten them freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// VM status poll interval during steady state.
    pub poll_interval_normal: Duration,
    /// VM status poll interval during time-sensitive transitions.
    pub poll_interval_fast: Duration,
    /// How long to wait for the backend to report the VM running.
    pub vm_start: Duration,
    /// How long to wait for the in-guest shutdown command to take effect.
    pub vm_soft_close: Duration,
    /// How long to wait for a forced power-off to take effect.
    pub vm_hard_close: Duration,
    /// Per-attempt connect timeout applied to each transport instance.
    pub ssh_try_connect: Duration,
    /// Reconnect attempt interval while actively connecting.
    pub ssh_retry_normal: Duration,
    /// Reconnect attempt interval after a surfaced connection error.
    pub ssh_retry_slow: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval_normal: Duration::from_secs(10),
            poll_interval_fast: Duration::from_secs(1),
            vm_start: Duration::from_secs(10),
            vm_soft_close: Duration::from_secs(15),
            vm_hard_close: Duration::from_secs(15),
            ssh_try_connect: Duration::from_secs(3),
            ssh_retry_normal: Duration::from_secs(1),
            ssh_retry_slow: Duration::from_secs(10),
        }
    }
}
