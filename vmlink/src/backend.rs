//! VM backend abstraction.
//!
//! The controller never talks to a hypervisor directly; it goes through this
//! trait. Implementations wrap whatever drives the actual VM (a hypervisor
//! CLI, a management daemon, a mock in tests).

use async_trait::async_trait;

use crate::error::VmlinkResult;

/// Result of a VM status probe.
///
/// Both fields are always produced together so a single state-machine pass
/// never observes a torn combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmProbe {
    /// The VM is currently running.
    pub running: bool,
    /// The VM is known to (registered with) the backend at all.
    pub registered: bool,
}

/// Static information about a VM fetched from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmInfo {
    /// The VM is running without a visible console.
    pub headless: bool,
}

/// Operations on a named virtual machine.
///
/// All methods are asynchronous; the controller dispatches them on background
/// tasks and consumes the results as events. Implementations must tolerate
/// concurrent calls for the same VM (a probe may race a start request).
#[async_trait]
pub trait VmBackend: Send + Sync {
    /// Request the VM to start, headless or with a console.
    ///
    /// Completion does not imply the VM is running - the controller keeps
    /// polling [`probe`](Self::probe) until it is.
    async fn start_virtual_machine(&self, name: &str, headless: bool) -> VmlinkResult<()>;

    /// Force the VM off, bypassing the guest (hard close).
    async fn shut_virtual_machine(&self, name: &str) -> VmlinkResult<()>;

    /// Query whether the VM is running and registered.
    async fn probe(&self, name: &str) -> VmlinkResult<VmProbe>;

    /// Fetch static VM information.
    async fn fetch_info(&self, name: &str) -> VmlinkResult<VmInfo>;
}
