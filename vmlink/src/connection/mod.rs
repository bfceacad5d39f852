//! VM connection controller.
//!
//! [`VmConnection`] coordinates two coupled state machines - one owning the
//! VM lifecycle, one owning the SSH channel into it - behind a small public
//! API: `connect`, `disconnect`, `lock_down`, `refresh`, and a derived
//! [`Status`] published through a watch channel.
//!
//! ## Architecture
//!
//! - `core`: event loop and shared machine context (single-writer)
//! - `vm_machine` / `ssh_machine`: the two state-transition functions
//! - `poller`: asynchronous VM status probing with sync-ack support
//! - `timers`: generation-tagged timers
//! - `status`: machine states and status derivation
//!
//! The handle talks to the event loop exclusively through messages; blocking
//! variants of `connect` and `lock_down` await the published snapshot rather
//! than holding any lock.

mod core;
mod events;
mod poller;
mod ssh_machine;
mod status;
mod timers;
mod vm_machine;


pub use self::core::ConnectionSetup;
pub use self::status::{SshState, Status, StatusSnapshot, VmState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::{oneshot, watch};

use crate::backend::VmBackend;
use crate::config::VmIdentity;

use self::core::ConnectionCore;
use self::events::{Command, ConnectDecision, Event, InspectReport, LockDownDecision};

/// Options for a connect request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Ask the user before starting the VM.
    pub ask_start_vm: bool,
    /// Block until the request settles.
    pub block: bool,
}

impl ConnectOptions {
    /// Options for a blocking connect.
    pub fn blocking() -> Self {
        Self {
            block: true,
            ..Self::default()
        }
    }
}

/// Whether an operation should wait for its effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synchronization {
    Asynchronous,
    Synchronous,
}

/// Answer to [`VmConnection::is_virtual_machine_off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmOffInfo {
    /// The VM is neither running nor being started.
    pub off: bool,
    /// The VM was found running rather than started by this controller.
    pub started_outside: bool,
    /// The VM is (or is being started) headless.
    pub running_headless: bool,
}

/// Handle to a connection controller.
///
/// Construction spawns the controller's event-loop task; dropping the handle
/// shuts it down and releases the VM name in the registry. The handle itself
/// holds no machine state - getters read the last published snapshot and
/// requests are messages to the loop.
pub struct VmConnection {
    tx: mpsc::UnboundedSender<Event>,
    snapshot: watch::Receiver<StatusSnapshot>,
    backend: Arc<dyn VmBackend>,
}

impl VmConnection {
    /// Spawn a controller for the VM described by `setup.identity`.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(setup: ConnectionSetup) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(StatusSnapshot::default());

        let backend = Arc::clone(&setup.backend);
        let core = ConnectionCore::new(setup, tx.clone(), snapshot_tx);
        tokio::spawn(core.run(rx));

        Self {
            tx,
            snapshot: snapshot_rx,
            backend,
        }
    }

    /// Current externally visible status.
    pub fn status(&self) -> Status {
        self.snapshot.borrow().status
    }

    /// Human-readable error message, present while `status() == Error`.
    pub fn error_string(&self) -> Option<String> {
        self.snapshot.borrow().error.clone()
    }

    /// Subscribe to status-change notifications.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot.clone()
    }

    /// Replace the VM identity.
    ///
    /// No-op if unchanged. Otherwise both state machines are reset and
    /// in-flight operations for the old identity may not complete.
    pub fn set_identity(&self, identity: VmIdentity) {
        let _ = self.tx.send(Event::Command(Command::SetIdentity(identity)));
    }

    /// Request a connection to the VM, starting it if necessary.
    ///
    /// Returns `true` immediately if already connected. Without
    /// [`ConnectOptions::block`] the return value is `false` whenever
    /// settling is asynchronous - watch [`subscribe`](Self::subscribe) for
    /// the outcome. With `block`, waits until the connection is established
    /// (`true`) or definitely failed (`false`).
    ///
    /// A request made while a lock-down or disconnect is in progress is a
    /// usage error: it is rejected with a warning and `false`.
    pub async fn connect(&self, options: ConnectOptions) -> bool {
        let mut rx = self.snapshot.clone();
        let mut previous = rx.borrow_and_update().status;

        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(Event::Command(Command::Connect {
                options,
                reply: reply_tx,
            }))
            .is_err()
        {
            return false;
        }
        let decision = match reply_rx.await {
            Ok(decision) => decision,
            Err(_) => return false,
        };

        match decision {
            ConnectDecision::AlreadyConnected => true,
            ConnectDecision::Rejected => false,
            ConnectDecision::Pending => {
                if !options.block {
                    return false;
                }
                // Wait for the request to settle, reacting to status
                // *changes* only so that unrelated snapshot updates (an
                // error-string refresh, a vm_off flip) cannot end the wait
                // early.
                loop {
                    if rx.changed().await.is_err() {
                        return false;
                    }
                    let status = rx.borrow_and_update().status;
                    if status == previous {
                        continue;
                    }
                    previous = status;
                    match status {
                        Status::Connected => return true,
                        Status::Disconnected | Status::Error => return false,
                        _ => {}
                    }
                }
            }
        }
    }

    /// Request a disconnect (and, unless the VM was started outside, a VM
    /// shutdown). Idempotent; warns if a connect is in progress.
    pub fn disconnect(&self) {
        let _ = self.tx.send(Event::Command(Command::Disconnect));
    }

    /// Enable or disable lock-down.
    ///
    /// Enabling blocks until the VM is fully off (`true`) or the attempt is
    /// abandoned through the user prompt (`false`). Disabling resumes normal
    /// operation and returns `true` immediately. While a lock-down is
    /// pending, a second enable request is a warned no-op returning `false`.
    pub async fn lock_down(&self, enable: bool) -> bool {
        if !enable {
            let (reply_tx, _reply_rx) = oneshot::channel();
            let _ = self.tx.send(Event::Command(Command::LockDown {
                enable: false,
                reply: reply_tx,
            }));
            return true;
        }

        let mut rx = self.snapshot.clone();
        let baseline_failures = rx.borrow_and_update().lock_down_failures;

        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(Event::Command(Command::LockDown {
                enable: true,
                reply: reply_tx,
            }))
            .is_err()
        {
            return false;
        }
        match reply_rx.await {
            Ok(LockDownDecision::Pending) => {}
            Ok(LockDownDecision::Rejected) | Err(_) => return false,
        }

        // Make sure the decision below is based on a fresh probe.
        self.refresh(Synchronization::Synchronous).await;

        loop {
            {
                let snapshot = rx.borrow_and_update();
                if snapshot.lock_down_failures > baseline_failures {
                    return false;
                }
                if snapshot.vm_off {
                    return true;
                }
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Force an immediate VM status probe.
    ///
    /// With [`Synchronization::Synchronous`], waits until the probe result
    /// has been applied and the state machines have settled on it.
    pub async fn refresh(&self, synchronization: Synchronization) {
        match synchronization {
            Synchronization::Asynchronous => {
                let _ = self.tx.send(Event::Command(Command::Refresh { done: None }));
            }
            Synchronization::Synchronous => {
                let (done_tx, done_rx) = oneshot::channel();
                if self
                    .tx
                    .send(Event::Command(Command::Refresh {
                        done: Some(done_tx),
                    }))
                    .is_ok()
                {
                    let _ = done_rx.await;
                }
            }
        }
    }

    /// Enable or disable automatic connection while the VM is running.
    pub fn set_auto_connect_enabled(&self, enabled: bool) {
        let _ = self
            .tx
            .send(Event::Command(Command::SetAutoConnect(enabled)));
    }

    /// Whether automatic connection is enabled. `false` once closed.
    pub async fn is_auto_connect_enabled(&self) -> bool {
        self.inspect()
            .await
            .map(|report| report.auto_connect_enabled)
            .unwrap_or(false)
    }

    /// The configured VM identity, or `None` once closed.
    pub async fn identity(&self) -> Option<VmIdentity> {
        self.inspect().await.map(|report| report.identity)
    }

    /// Whether the VM is fully off, with start-related context.
    pub async fn is_virtual_machine_off(&self) -> VmOffInfo {
        let Some(report) = self.inspect().await else {
            return VmOffInfo {
                off: true,
                started_outside: false,
                running_headless: false,
            };
        };

        let running_headless = if report.vm_running {
            self.backend
                .fetch_info(&report.identity.name)
                .await
                .map(|info| info.headless)
                .unwrap_or(false)
        } else if report.vm_starting {
            // Try to be accurate about what is about to run.
            report.identity.headless
        } else {
            false
        };

        VmOffInfo {
            off: report.vm_off,
            started_outside: report.started_outside,
            running_headless,
        }
    }

    /// Shut the controller down explicitly.
    ///
    /// Equivalent to dropping the handle; provided for call sites that want
    /// the shutdown to be visible in the code.
    pub fn close(&self) {
        let _ = self.tx.send(Event::Close);
    }

    async fn inspect(&self) -> Option<InspectReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Event::Command(Command::Inspect { reply: reply_tx }))
            .ok()?;
        reply_rx.await.ok()
    }
}

impl Drop for VmConnection {
    fn drop(&mut self) {
        let _ = self.tx.send(Event::Close);
    }
}

impl std::fmt::Debug for VmConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmConnection")
            .field("status", &self.status())
            .finish()
    }
}
