//! Internal events driving the controller's event loop.
//!
//! Everything that happens to the controller - public API calls, probe
//! completions, transport reports, timer expiries, answered questions - is
//! funneled through one channel as an [`Event`]. The loop applies events to
//! cached inputs and request flags only, then runs settled state-machine
//! passes; no state is ever mutated from a completion context.

use tokio::sync::oneshot;

use crate::backend::VmProbe;
use crate::config::VmIdentity;
use crate::interaction::Question;
use crate::remote::RunnerEvent;
use crate::transport::TransportEvent;

use super::ConnectOptions;

/// Identifies one of the controller's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    VmStart,
    VmSoftClose,
    VmHardClose,
    VmPoll,
    SshRetry,
}

/// Immediate reply to a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectDecision {
    /// Already connected; nothing to wait for.
    AlreadyConnected,
    /// Request accepted (or merged with a pending one); settling is
    /// asynchronous.
    Pending,
    /// Request ignored (lock-down active, or a disconnect is in flight).
    Rejected,
}

/// Immediate reply to a lock-down enable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockDownDecision {
    /// Request accepted; wait for the VM to go off or the attempt to fail.
    Pending,
    /// A lock-down is already pending.
    Rejected,
}

/// Snapshot of controller internals for synchronous-looking getters.
#[derive(Debug, Clone)]
pub(crate) struct InspectReport {
    pub identity: VmIdentity,
    pub vm_off: bool,
    pub vm_starting: bool,
    pub vm_running: bool,
    pub started_outside: bool,
    pub auto_connect_enabled: bool,
}

/// Public API requests.
pub(crate) enum Command {
    SetIdentity(VmIdentity),
    Connect {
        options: ConnectOptions,
        reply: oneshot::Sender<ConnectDecision>,
    },
    Disconnect,
    LockDown {
        enable: bool,
        reply: oneshot::Sender<LockDownDecision>,
    },
    Refresh {
        done: Option<oneshot::Sender<()>>,
    },
    SetAutoConnect(bool),
    Inspect {
        reply: oneshot::Sender<InspectReport>,
    },
}

/// One occurrence merged into the controller's event loop.
pub(crate) enum Event {
    Command(Command),
    /// A VM status probe completed; both fields are applied atomically.
    VmProbed(VmProbe),
    /// A VM status probe failed; cached values stay untouched.
    VmProbeFailed { message: String },
    /// Report from transport instance `conn_id`; stale instances are ignored.
    Ssh {
        conn_id: u64,
        event: TransportEvent,
    },
    /// Report from the shutdown command dispatched in soft-close round `round`.
    Runner {
        round: u64,
        event: RunnerEvent,
    },
    /// Timer expiry; ignored unless `generation` matches the timer's current
    /// arming.
    Timer {
        kind: TimerKind,
        generation: u64,
    },
    /// A question got an answer readable from the interaction handler.
    QuestionAnswered(Question),
    /// Shut the controller down.
    Close,
}
