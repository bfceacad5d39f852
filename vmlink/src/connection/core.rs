//! The controller's event loop and shared state-machine context.
//!
//! All machine state lives in [`ConnectionCore`], owned by a single task.
//! Background work (probes, transport connects, remote commands, timers)
//! reports back exclusively through the event channel, so state is only ever
//! mutated while the loop is applying events or running step functions -
//! a single-writer discipline with no locks.
//!
//! Events are drained in batches: every ready event is applied to the cached
//! inputs and request flags first, then the state machines run until both
//! settle. Any number of back-to-back triggers (a poll result landing
//! together with a timer expiry) produce exactly one settled pass.

use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use crate::backend::{VmBackend, VmProbe};
use crate::config::{Timeouts, VmIdentity};
use crate::interaction::{InteractionHandler, Question, QuestionNotifier, QuestionStatus, Warning};
use crate::registry::VmRegistry;
use crate::remote::{CommandRunner, RemoteShutdown, RunnerSink};
use crate::transport::{SshError, SshTransport, SshTransportFactory, TransportEvent, TransportSink};

use super::events::{
    Command, ConnectDecision, Event, InspectReport, LockDownDecision, TimerKind,
};
use super::poller::VmPoller;
use super::status::{derive_status, SshState, Status, StatusSnapshot, VmState};
use super::timers::{IntervalTimer, StateTimer};
use super::ConnectOptions;

/// Collaborators and configuration handed to a new controller.
pub struct ConnectionSetup {
    pub identity: VmIdentity,
    pub backend: Arc<dyn VmBackend>,
    pub transport_factory: Arc<dyn SshTransportFactory>,
    pub runner: Arc<dyn CommandRunner>,
    pub interaction: Box<dyn InteractionHandler>,
    pub registry: VmRegistry,
    pub timeouts: Timeouts,
}

/// Result of consulting the interaction surface about a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Answer {
    Pending,
    Yes,
    No,
}

pub(super) struct ConnectionCore {
    pub(super) tx: UnboundedSender<Event>,
    snapshot_tx: watch::Sender<StatusSnapshot>,

    pub(super) backend: Arc<dyn VmBackend>,
    pub(super) transport_factory: Arc<dyn SshTransportFactory>,
    pub(super) runner: Arc<dyn CommandRunner>,
    pub(super) ui: Box<dyn InteractionHandler>,
    pub(super) registry: VmRegistry,
    pub(super) timeouts: Timeouts,
    pub(super) identity: VmIdentity,

    pub(super) status: Status,
    pub(super) error_string: Option<String>,

    pub(super) vm_state: VmState,
    pub(super) vm_state_entered: Instant,
    pub(super) vm_started_outside: bool,
    pub(super) vm_stm_transition: bool,
    pub(super) ssh_state: SshState,
    pub(super) ssh_stm_transition: bool,
    pub(super) ssh_had_session: bool,

    // request flags
    pub(super) lock_down_requested: bool,
    pub(super) lock_down_failed: bool,
    pub(super) lock_down_aborted: bool,
    pub(super) lock_down_failures: u64,
    pub(super) auto_connect_enabled: bool,
    pub(super) connect_requested: bool,
    pub(super) disconnect_requested: bool,
    pub(super) connect_later_requested: bool,
    pub(super) connect_options: ConnectOptions,

    // cached probe and transport results
    pub(super) cached_vm_running: bool,
    pub(super) cached_vm_registered: bool,
    pub(super) cached_ssh_connected: bool,
    pub(super) cached_ssh_error: Option<SshError>,
    pub(super) cached_ssh_error_origin: Option<u64>,

    // pass scheduling
    pub(super) vm_pass_pending: bool,
    pub(super) ssh_pass_pending: bool,

    // exclusively owned collaborator instances
    pub(super) transport: Option<Box<dyn SshTransport>>,
    pub(super) transport_id: u64,
    pub(super) shutdown: Option<RemoteShutdown>,
    pub(super) shutdown_round: u64,

    // timers
    pub(super) vm_start_timer: StateTimer,
    pub(super) vm_soft_close_timer: StateTimer,
    pub(super) vm_hard_close_timer: StateTimer,
    pub(super) poll_timer: IntervalTimer,
    pub(super) ssh_retry_timer: IntervalTimer,
    pub(super) fast_poll_refs: u8,

    pub(super) poller: VmPoller,
    pending_acks: Vec<oneshot::Sender<()>>,
    closing: bool,
}

impl ConnectionCore {
    pub fn new(
        setup: ConnectionSetup,
        tx: UnboundedSender<Event>,
        snapshot_tx: watch::Sender<StatusSnapshot>,
    ) -> Self {
        Self {
            backend: setup.backend,
            transport_factory: setup.transport_factory,
            runner: setup.runner,
            ui: setup.interaction,
            registry: setup.registry,
            timeouts: setup.timeouts,
            identity: setup.identity,

            status: Status::Disconnected,
            error_string: None,

            vm_state: VmState::Off,
            vm_state_entered: Instant::now(),
            vm_started_outside: false,
            vm_stm_transition: false,
            ssh_state: SshState::NotConnected,
            ssh_stm_transition: false,
            ssh_had_session: false,

            lock_down_requested: false,
            lock_down_failed: false,
            lock_down_aborted: false,
            lock_down_failures: 0,
            auto_connect_enabled: true,
            connect_requested: false,
            disconnect_requested: false,
            connect_later_requested: false,
            connect_options: ConnectOptions::default(),

            cached_vm_running: false,
            cached_vm_registered: true,
            cached_ssh_connected: false,
            cached_ssh_error: None,
            cached_ssh_error_origin: None,

            vm_pass_pending: false,
            ssh_pass_pending: false,

            transport: None,
            transport_id: 0,
            shutdown: None,
            shutdown_round: 0,

            vm_start_timer: StateTimer::new(TimerKind::VmStart, tx.clone()),
            vm_soft_close_timer: StateTimer::new(TimerKind::VmSoftClose, tx.clone()),
            vm_hard_close_timer: StateTimer::new(TimerKind::VmHardClose, tx.clone()),
            poll_timer: IntervalTimer::new(TimerKind::VmPoll, tx.clone()),
            ssh_retry_timer: IntervalTimer::new(TimerKind::SshRetry, tx.clone()),
            fast_poll_refs: 0,

            poller: VmPoller::new(tx.clone()),
            pending_acks: Vec::new(),
            closing: false,

            tx,
            snapshot_tx,
        }
    }

    /// Drive the controller until closed.
    pub async fn run(mut self, mut rx: UnboundedReceiver<Event>) {
        if !self.registry.register(&self.identity.name) {
            tracing::warn!(
                vm = %self.identity.name,
                "another connection controller for this VM already exists"
            );
        }

        self.poll_timer.start(self.timeouts.poll_interval_normal);
        self.poll_state(None);
        self.schedule_vm_pass();
        self.schedule_ssh_pass();
        self.run_passes();
        self.resolve_acks();

        loop {
            let Some(event) = rx.recv().await else { break };
            self.apply(event);
            while let Ok(event) = rx.try_recv() {
                self.apply(event);
            }

            if self.closing {
                break;
            }

            self.run_passes();
            self.resolve_acks();
        }

        tracing::debug!(vm = %self.identity.name, "connection controller closed");
        self.registry.release(&self.identity.name);
    }

    /// Apply one event to cached inputs and request flags.
    ///
    /// No state-machine transition happens here; the event at most schedules
    /// a pass.
    pub(super) fn apply(&mut self, event: Event) {
        match event {
            Event::Command(command) => self.handle_command(command),
            Event::VmProbed(probe) => self.apply_probe(probe),
            Event::VmProbeFailed { message } => {
                tracing::warn!(vm = %self.identity.name, %message, "VM status probe failed");
                self.pending_acks.extend(self.poller.finish());
            }
            Event::Ssh { conn_id, event } => self.apply_transport_event(conn_id, event),
            Event::Runner { round, event } => {
                if round != self.shutdown_round {
                    tracing::trace!("ignoring report from a replaced shutdown command");
                    return;
                }
                if let Some(shutdown) = self.shutdown.as_mut() {
                    if shutdown.apply(event) {
                        tracing::debug!(
                            vm = %self.identity.name,
                            error = shutdown.is_error(),
                            "remote shutdown command finished"
                        );
                    }
                    self.schedule_vm_pass();
                }
            }
            Event::Timer { kind, generation } => self.apply_timer(kind, generation),
            Event::QuestionAnswered(question) => {
                tracing::debug!(?question, "question answered");
                self.schedule_vm_pass();
                self.schedule_ssh_pass();
            }
            Event::Close => self.closing = true,
        }
    }

    fn apply_probe(&mut self, probe: VmProbe) {
        let mut changed = false;

        if probe.running != self.cached_vm_running {
            tracing::debug!(
                vm = %self.identity.name,
                running = probe.running,
                "VM running state changed"
            );
            self.cached_vm_running = probe.running;
            changed = true;
        }

        if probe.registered != self.cached_vm_registered {
            tracing::debug!(
                vm = %self.identity.name,
                registered = probe.registered,
                "VM registration state changed"
            );
            self.cached_vm_registered = probe.registered;
            changed = true;
        }

        if changed {
            self.schedule_vm_pass();
        }

        self.pending_acks.extend(self.poller.finish());
    }

    fn apply_transport_event(&mut self, conn_id: u64, event: TransportEvent) {
        if conn_id != self.transport_id || self.transport.is_none() {
            tracing::trace!("ignoring report from a replaced transport");
            return;
        }

        match event {
            TransportEvent::Connected => {
                tracing::debug!(vm = %self.identity.name, "ssh connected");
                self.cached_ssh_connected = true;
                self.cached_ssh_error = None;
                self.cached_ssh_error_origin = None;
                self.schedule_ssh_pass();
            }
            TransportEvent::Disconnected => {
                tracing::debug!(vm = %self.identity.name, "ssh disconnected");
                self.cached_ssh_connected = false;
                self.poll_state(None);
                self.schedule_ssh_pass();
            }
            TransportEvent::Error(error) => {
                tracing::debug!(vm = %self.identity.name, %error, "ssh error");
                self.cached_ssh_error = Some(error);
                self.cached_ssh_error_origin = Some(conn_id);
                self.poll_state(None);
                self.schedule_ssh_pass();
            }
        }
    }

    fn apply_timer(&mut self, kind: TimerKind, generation: u64) {
        match kind {
            TimerKind::VmStart => {
                if self.vm_start_timer.expire(generation) {
                    tracing::debug!(vm = %self.identity.name, "VM start timeout");
                    self.schedule_vm_pass();
                }
            }
            TimerKind::VmSoftClose => {
                if self.vm_soft_close_timer.expire(generation) {
                    tracing::debug!(vm = %self.identity.name, "VM soft-close timeout");
                    self.schedule_vm_pass();
                }
            }
            TimerKind::VmHardClose => {
                if self.vm_hard_close_timer.expire(generation) {
                    tracing::debug!(vm = %self.identity.name, "VM hard-close timeout");
                    self.schedule_vm_pass();
                }
            }
            TimerKind::VmPoll => {
                if self.poll_timer.accepts(generation) {
                    self.poll_state(None);
                }
            }
            TimerKind::SshRetry => {
                if self.ssh_retry_timer.accepts(generation) {
                    self.ssh_try_connect();
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetIdentity(identity) => self.set_identity(identity),
            Command::Connect { options, reply } => {
                let decision = self.request_connect(options);
                let _ = reply.send(decision);
            }
            Command::Disconnect => self.request_disconnect(),
            Command::LockDown { enable, reply } => {
                let decision = self.request_lock_down(enable);
                let _ = reply.send(decision);
            }
            Command::Refresh { done } => {
                tracing::debug!(vm = %self.identity.name, "refresh requested");
                self.poll_state(done);
            }
            Command::SetAutoConnect(enabled) => {
                if self.auto_connect_enabled != enabled {
                    self.auto_connect_enabled = enabled;
                    self.schedule_vm_pass();
                    self.schedule_ssh_pass();
                }
            }
            Command::Inspect { reply } => {
                let _ = reply.send(InspectReport {
                    identity: self.identity.clone(),
                    vm_off: self.is_vm_off(),
                    vm_starting: self.vm_state == VmState::Starting,
                    vm_running: self.cached_vm_running,
                    started_outside: self.vm_started_outside,
                    auto_connect_enabled: self.auto_connect_enabled,
                });
            }
        }
    }

    fn set_identity(&mut self, identity: VmIdentity) {
        if self.identity == identity {
            return;
        }
        tracing::debug!(vm = %identity.name, "replacing VM identity");

        if identity.name != self.identity.name {
            self.registry.release(&self.identity.name);
            if !self.registry.register(&identity.name) {
                tracing::warn!(
                    vm = %identity.name,
                    "another connection controller for this VM already exists"
                );
            }
        }
        self.identity = identity;

        // Drop a transport stuck on the old parameters so the new ones take
        // effect on the next attempt.
        if matches!(
            self.ssh_state,
            SshState::ConnectingError | SshState::ConnectionLost
        ) {
            self.transport = None;
        }

        self.cached_vm_registered = true;
        self.cached_vm_running = false;
        self.ssh_had_session = false;

        self.poll_timer.start(if self.fast_poll_refs > 0 {
            self.timeouts.poll_interval_fast
        } else {
            self.timeouts.poll_interval_normal
        });
        self.poll_state(None);
        self.schedule_vm_pass();
        self.schedule_ssh_pass();
    }

    fn request_connect(&mut self, mut options: ConnectOptions) -> ConnectDecision {
        tracing::debug!(vm = %self.identity.name, "connect requested");

        if !self.ui.should_ask(Question::StartVm) {
            options.ask_start_vm = false;
        }
        // Turning the ask option off always overrides a pending ask.
        if self.connect_options.ask_start_vm && !options.ask_start_vm {
            self.connect_options.ask_start_vm = false;
        }

        self.poll_state(None);
        self.schedule_vm_pass();
        self.schedule_ssh_pass();

        if self.lock_down_requested {
            tracing::warn!(vm = %self.identity.name, "connect request ignored: lock-down active");
            return ConnectDecision::Rejected;
        }
        if self.status == Status::Connected {
            return ConnectDecision::AlreadyConnected;
        }
        if self.connect_requested || self.connect_later_requested {
            return ConnectDecision::Pending;
        }
        if self.disconnect_requested {
            self.ui.warn(Warning::AlreadyDisconnecting);
            return ConnectDecision::Rejected;
        }

        if self.status == Status::Error {
            // Recover by disconnecting first, then reconnecting.
            self.disconnect_requested = true;
            self.connect_later_requested = true;
            self.connect_options = ConnectOptions {
                ask_start_vm: false,
                ..options
            };
        } else {
            self.connect_requested = true;
            self.connect_options = options;
        }
        ConnectDecision::Pending
    }

    fn request_disconnect(&mut self) {
        tracing::debug!(vm = %self.identity.name, "disconnect requested");

        if self.lock_down_requested {
            return;
        }
        if self.status == Status::Disconnected {
            return;
        }
        if self.disconnect_requested && !self.connect_later_requested {
            return;
        }
        if self.connect_requested || self.connect_later_requested {
            self.ui.warn(Warning::AlreadyConnecting);
            return;
        }

        self.disconnect_requested = true;
        self.schedule_ssh_pass();
        self.schedule_vm_pass();
    }

    fn request_lock_down(&mut self, enable: bool) -> LockDownDecision {
        if enable {
            if self.lock_down_requested {
                tracing::warn!(
                    vm = %self.identity.name,
                    "lock-down request ignored: already locking down"
                );
                return LockDownDecision::Rejected;
            }
            tracing::debug!(vm = %self.identity.name, "lock-down begin");
            self.lock_down_requested = true;
            self.connect_later_requested = false;
            self.poll_state(None);
            self.schedule_vm_pass();
            self.schedule_ssh_pass();
            LockDownDecision::Pending
        } else {
            tracing::debug!(vm = %self.identity.name, "lock-down end");
            self.lock_down_requested = false;
            self.lock_down_failed = false;
            self.poll_state(None);
            self.schedule_vm_pass();
            self.schedule_ssh_pass();
            LockDownDecision::Pending
        }
    }

    /// Run settled passes of both machines.
    ///
    /// A VM transition that affects SSH eligibility schedules an SSH pass and
    /// vice versa, so the loop continues until neither machine has work.
    pub(super) fn run_passes(&mut self) {
        while self.vm_pass_pending || self.ssh_pass_pending {
            if self.vm_pass_pending {
                self.vm_pass_pending = false;
                self.vm_stm_exec();
            }
            if self.ssh_pass_pending {
                self.ssh_pass_pending = false;
                self.ssh_stm_exec();
            }
        }

        if self.lock_down_aborted {
            self.lock_down_aborted = false;
            self.lock_down_requested = false;
            self.lock_down_failed = false;
        }

        debug_assert!(
            self.vm_state == VmState::Running || self.ssh_state == SshState::NotConnected,
            "ssh machine must be NotConnected while vm machine is {:?}",
            self.vm_state
        );

        self.publish();
    }

    fn resolve_acks(&mut self) {
        for ack in self.pending_acks.drain(..) {
            let _ = ack.send(());
        }
    }

    pub(super) fn schedule_vm_pass(&mut self) {
        self.vm_pass_pending = true;
    }

    pub(super) fn schedule_ssh_pass(&mut self) {
        self.ssh_pass_pending = true;
    }

    /// The VM is fully off: not running and not currently being started.
    pub(super) fn is_vm_off(&self) -> bool {
        !self.cached_vm_running && self.vm_state != VmState::Starting
    }

    pub(super) fn within_boot_grace(&self) -> bool {
        self.vm_state_entered.elapsed() < self.identity.ssh.connect_timeout
    }

    fn publish(&mut self) {
        let snapshot = StatusSnapshot {
            status: self.status,
            error: self.error_string.clone(),
            vm_off: self.is_vm_off(),
            lock_down_failures: self.lock_down_failures,
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    /// Recompute the externally visible status after a machine pass settled.
    pub(super) fn update_status(&mut self) {
        let (status, error) = self.derive_with_error();
        self.error_string = error;

        if status == self.status {
            return;
        }
        let old = self.status;
        self.status = status;

        // A disconnect that was requested only to recover from an error
        // continues straight into a new connect.
        if self.status == Status::Disconnected && self.connect_later_requested {
            self.status = Status::StartingVm;
            self.connect_later_requested = false;
            self.connect_requested = true;
            debug_assert!(!self.disconnect_requested);
            self.poll_state(None);
            self.schedule_vm_pass();
            self.schedule_ssh_pass();
        }

        tracing::debug!(
            vm = %self.identity.name,
            from = ?old,
            to = ?self.status,
            "connection status changed"
        );
        if self.status == Status::Error {
            tracing::warn!(
                vm = %self.identity.name,
                error = %self.error_string.as_deref().unwrap_or("unknown"),
                "connection entered error state"
            );
        }
    }

    fn derive_with_error(&self) -> (Status, Option<String>) {
        let status = derive_status(self.vm_state, self.ssh_state);
        if status != Status::Error {
            return (status, None);
        }

        let ssh_error = self
            .cached_ssh_error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "unknown error".to_string());

        let message = match (self.vm_state, self.ssh_state) {
            (VmState::StartingError, _) => {
                format!("failed to start virtual machine \"{}\"", self.identity.name)
            }
            (VmState::Running, SshState::ConnectingError) => {
                let mut message = format!(
                    "failed to establish SSH connection with virtual machine \"{}\": {}",
                    self.identity.name, ssh_error
                );
                if !self.within_boot_grace() {
                    message.push_str(" (consider increasing the SSH connection timeout)");
                }
                message
            }
            (VmState::Running, SshState::ConnectionLost) => format!(
                "SSH connection with virtual machine \"{}\" has been lost: {}",
                self.identity.name, ssh_error
            ),
            _ => format!("virtual machine \"{}\" connection error", self.identity.name),
        };
        (status, Some(message))
    }

    /// Request a VM status probe, optionally with a completion ack.
    pub(super) fn poll_state(&mut self, ack: Option<oneshot::Sender<()>>) {
        self.poller.request(&self.backend, &self.identity.name, ack);
    }

    /// Temporarily request (or release) the fast poll interval.
    ///
    /// Reference-counted: at most one request from the VM machine and one
    /// from the SSH machine may be outstanding.
    pub(super) fn want_fast_poll(&mut self, want: bool) {
        if want {
            debug_assert!(self.fast_poll_refs < 2, "fast-poll refcount overflow");
            self.fast_poll_refs += 1;
            if self.fast_poll_refs == 1 {
                tracing::debug!(vm = %self.identity.name, "fast VM status polling on");
                self.poll_timer.start(self.timeouts.poll_interval_fast);
            }
        } else {
            debug_assert!(self.fast_poll_refs > 0, "fast-poll refcount underflow");
            self.fast_poll_refs = self.fast_poll_refs.saturating_sub(1);
            if self.fast_poll_refs == 0 {
                tracing::debug!(vm = %self.identity.name, "fast VM status polling off");
                self.poll_timer.start(self.timeouts.poll_interval_normal);
            }
        }
    }

    /// Consult the interaction surface about `question`.
    ///
    /// Pending means the question is on screen; an answered question keeps
    /// its answer until dismissed on state exit.
    pub(super) fn ask(&mut self, question: Question) -> Answer {
        match self.ui.status(question) {
            QuestionStatus::NotAsked => {
                let tx = self.tx.clone();
                let notifier = QuestionNotifier::new(move |q| {
                    let _ = tx.send(Event::QuestionAnswered(q));
                });
                self.ui.ask(question, notifier);
                // An automated handler answers synchronously.
                match self.ui.status(question) {
                    QuestionStatus::Yes => Answer::Yes,
                    QuestionStatus::No => Answer::No,
                    _ => Answer::Pending,
                }
            }
            QuestionStatus::Asked => Answer::Pending,
            QuestionStatus::Yes => Answer::Yes,
            QuestionStatus::No => Answer::No,
        }
    }

    /// Drop any existing transport and start a fresh connect attempt.
    pub(super) fn create_transport_and_connect(&mut self) {
        self.transport = None;
        self.transport_id += 1;

        let conn_id = self.transport_id;
        let tx = self.tx.clone();
        let sink = TransportSink::new(move |event| {
            let _ = tx.send(Event::Ssh { conn_id, event });
        });

        let mut params = self.identity.ssh.clone();
        params.connect_timeout = self.timeouts.ssh_try_connect;

        let mut transport = self.transport_factory.create(&params, sink);
        transport.connect_to_host();
        self.transport = Some(transport);
    }

    /// Periodic reconnect attempt while waiting for the guest SSH service.
    ///
    /// Only replaces the transport after it reported an error; without that
    /// guard an endless replace loop would suppress every SSH error.
    fn ssh_try_connect(&mut self) {
        let retry = match &self.transport {
            None => true,
            Some(transport) => {
                transport.state() == crate::transport::TransportState::Unconnected
                    && self.cached_ssh_error.is_some()
                    && self.cached_ssh_error_origin == Some(self.transport_id)
            }
        };
        if retry {
            tracing::debug!(
                vm = %self.identity.name,
                previous_error = ?self.cached_ssh_error.as_ref().map(|e| &e.message),
                "retrying ssh connect"
            );
            self.create_transport_and_connect();
        }
    }

    /// Dispatch the in-guest shutdown command for a soft close.
    pub(super) fn start_remote_shutdown(&mut self) {
        self.shutdown_round += 1;
        self.shutdown = Some(RemoteShutdown::new());

        let round = self.shutdown_round;
        let tx = self.tx.clone();
        let sink = RunnerSink::new(move |event| {
            let _ = tx.send(Event::Runner { round, event });
        });

        let mut params = self.identity.ssh.clone();
        params.connect_timeout = self.timeouts.ssh_try_connect;

        tracing::debug!(
            vm = %self.identity.name,
            command = %self.identity.shutdown_command,
            "running remote shutdown command"
        );
        self.runner.run(&self.identity.shutdown_command, &params, sink);
    }

    pub(super) fn spawn_vm_start(&self) {
        let backend = Arc::clone(&self.backend);
        let name = self.identity.name.clone();
        let headless = self.identity.headless;
        tokio::spawn(async move {
            if let Err(error) = backend.start_virtual_machine(&name, headless).await {
                tracing::warn!(vm = %name, %error, "failed to request VM start");
            }
        });
    }

    pub(super) fn spawn_vm_power_off(&self) {
        let backend = Arc::clone(&self.backend);
        let name = self.identity.name.clone();
        tokio::spawn(async move {
            if let Err(error) = backend.shut_virtual_machine(&name).await {
                tracing::warn!(vm = %name, %error, "failed to request VM power-off");
            }
        });
    }
}
