//! Crate-wide error type.

use thiserror::Error;

/// Result alias used throughout vmlink.
pub type VmlinkResult<T> = Result<T, VmlinkError>;

/// Errors reported by vmlink and its collaborator traits.
///
/// Expected operational failures (a VM that refuses to start, an SSH channel
/// that drops) are not errors at this level - they drive state-machine
/// transitions and surface through [`Status::Error`](crate::Status). This
/// enum covers collaborator and infrastructure failures only.
#[derive(Debug, Error)]
pub enum VmlinkError {
    /// VM backend operation failed (hypervisor unreachable, command failed).
    #[error("vm backend error: {0}")]
    Backend(String),

    /// Remote command execution failed before any outcome was observed.
    #[error("remote command error: {0}")]
    Remote(String),

    /// Logging initialization failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The connection controller task is gone.
    #[error("connection controller is closed")]
    Closed,

    /// Invariant violation or other internal error.
    #[error("internal error: {0}")]
    Internal(String),
}
