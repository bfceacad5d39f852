//! SSH transport abstraction.
//!
//! The SSH state machine owns exactly one transport instance at a time,
//! created fresh on every connect attempt and dropped on state exit.
//! Transports report progress exclusively through the [`TransportSink`]
//! handed to the factory; the controller turns those reports into
//! state-machine events.

use std::sync::Arc;

use crate::config::SshParams;

/// Classification of an SSH transport error.
///
/// The classification decides retry behavior: recoverable errors are retried
/// silently within the boot grace window, non-recoverable ones surface
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshErrorKind {
    /// Network-level socket error (refused, unreachable, reset).
    Socket,
    /// Connection or operation timed out.
    Timeout,
    /// SSH protocol violation.
    Protocol,
    /// The server closed the connection.
    ClosedByServer,
    /// Internal transport failure.
    Internal,
    /// The server's host key was rejected.
    HostKey,
    /// The private key file is missing or unreadable.
    KeyFile,
    /// Authentication was refused.
    Authentication,
}

impl SshErrorKind {
    /// Whether errors of this kind may resolve by simply retrying.
    ///
    /// Host-key, key-file and authentication failures will not fix
    /// themselves; everything else is worth retrying while the guest may
    /// still be booting.
    pub fn is_recoverable(self) -> bool {
        match self {
            SshErrorKind::Socket
            | SshErrorKind::Timeout
            | SshErrorKind::Protocol
            | SshErrorKind::ClosedByServer
            | SshErrorKind::Internal => true,
            SshErrorKind::HostKey | SshErrorKind::KeyFile | SshErrorKind::Authentication => false,
        }
    }
}

/// An error reported by a transport instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshError {
    pub kind: SshErrorKind,
    pub message: String,
}

impl std::fmt::Display for SshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Coarse transport connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Unconnected,
    Connecting,
    Connected,
}

/// Event reported by a transport to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Error(SshError),
}

/// Delivery handle for transport events.
///
/// Each sink is bound to the transport instance it was created for; events
/// from a replaced transport are discarded by the controller, so a trailing
/// report from a dropped instance cannot corrupt a newer attempt.
#[derive(Clone)]
pub struct TransportSink {
    deliver: Arc<dyn Fn(TransportEvent) + Send + Sync>,
}

impl TransportSink {
    pub(crate) fn new(deliver: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Report that the transport is connected.
    pub fn connected(&self) {
        (self.deliver)(TransportEvent::Connected);
    }

    /// Report that the transport is disconnected.
    pub fn disconnected(&self) {
        (self.deliver)(TransportEvent::Disconnected);
    }

    /// Report a transport error.
    pub fn error(&self, error: SshError) {
        (self.deliver)(TransportEvent::Error(error));
    }
}

impl std::fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSink").finish()
    }
}

/// A single SSH connection attempt.
///
/// Methods are fire-and-forget; results arrive through the sink the instance
/// was created with. Dropping the instance releases all session resources.
pub trait SshTransport: Send {
    /// Begin connecting to the configured host.
    fn connect_to_host(&mut self);

    /// Begin a graceful disconnect.
    fn disconnect_from_host(&mut self);

    /// Current connection state.
    fn state(&self) -> TransportState;
}

/// Factory creating transport instances.
///
/// The controller calls this on every `Connecting` entry with the connect
/// timeout already reduced to the per-attempt value.
pub trait SshTransportFactory: Send + Sync {
    fn create(&self, params: &SshParams, sink: TransportSink) -> Box<dyn SshTransport>;
}
