//! Machine states and the externally visible status.

/// VM lifecycle state, owned exclusively by the VM state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Off,
    AskBeforeStarting,
    Starting,
    StartingError,
    Running,
    SoftClosing,
    HardClosing,
    /// Running, but deliberately unmanaged (user declined to close it).
    Zombie,
}

/// SSH channel state, owned exclusively by the SSH state machine.
///
/// The machine may only leave `NotConnected` while the VM machine is in
/// [`VmState::Running`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshState {
    NotConnected,
    Connecting,
    ConnectingError,
    Connected,
    Disconnecting,
    Disconnected,
    ConnectionLost,
}

/// Externally visible connection status.
///
/// A pure derivation of the two machine states - never mutated directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Disconnected,
    StartingVm,
    Connecting,
    Error,
    Connected,
    Disconnecting,
    ClosingVm,
}

/// Derive the externally visible status from the two machine states.
///
/// Total over all state pairs; the SSH state only matters while the VM is
/// running, because that is the only time the SSH machine can be anywhere
/// other than `NotConnected`.
pub(crate) fn derive_status(vm: VmState, ssh: SshState) -> Status {
    match vm {
        VmState::Off | VmState::Zombie => Status::Disconnected,
        VmState::AskBeforeStarting | VmState::Starting => Status::StartingVm,
        VmState::StartingError => Status::Error,
        VmState::SoftClosing | VmState::HardClosing => Status::ClosingVm,
        VmState::Running => match ssh {
            SshState::NotConnected | SshState::Connecting => Status::Connecting,
            SshState::ConnectingError | SshState::ConnectionLost => Status::Error,
            SshState::Connected => Status::Connected,
            SshState::Disconnecting | SshState::Disconnected => Status::Disconnecting,
        },
    }
}

/// Published view of the controller, delivered through a watch channel.
///
/// Equality drives change notification: a snapshot is re-published only when
/// some field actually changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Derived connection status.
    pub status: Status,
    /// Human-readable error, present exactly while `status == Error`.
    pub error: Option<String>,
    /// The VM is fully off (not running and not being started).
    pub vm_off: bool,
    /// Number of abandoned lock-down attempts so far.
    pub lock_down_failures: u64,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: Status::Disconnected,
            error: None,
            vm_off: true,
            lock_down_failures: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VM_STATES: [VmState; 8] = [
        VmState::Off,
        VmState::AskBeforeStarting,
        VmState::Starting,
        VmState::StartingError,
        VmState::Running,
        VmState::SoftClosing,
        VmState::HardClosing,
        VmState::Zombie,
    ];

    const SSH_STATES: [SshState; 7] = [
        SshState::NotConnected,
        SshState::Connecting,
        SshState::ConnectingError,
        SshState::Connected,
        SshState::Disconnecting,
        SshState::Disconnected,
        SshState::ConnectionLost,
    ];

    #[test]
    fn derivation_is_total_and_deterministic() {
        for vm in VM_STATES {
            for ssh in SSH_STATES {
                let first = derive_status(vm, ssh);
                let second = derive_status(vm, ssh);
                assert_eq!(first, second, "unstable derivation for {vm:?}/{ssh:?}");
            }
        }
    }

    #[test]
    fn ssh_state_is_irrelevant_unless_vm_running() {
        for vm in VM_STATES {
            if vm == VmState::Running {
                continue;
            }
            let reference = derive_status(vm, SshState::NotConnected);
            for ssh in SSH_STATES {
                assert_eq!(derive_status(vm, ssh), reference);
            }
        }
    }

    #[test]
    fn running_maps_ssh_states() {
        assert_eq!(
            derive_status(VmState::Running, SshState::Connected),
            Status::Connected
        );
        assert_eq!(
            derive_status(VmState::Running, SshState::Connecting),
            Status::Connecting
        );
        assert_eq!(
            derive_status(VmState::Running, SshState::ConnectionLost),
            Status::Error
        );
        assert_eq!(
            derive_status(VmState::Running, SshState::Disconnecting),
            Status::Disconnecting
        );
    }
}
