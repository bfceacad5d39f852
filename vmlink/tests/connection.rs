//! End-to-end tests for the connection controller.
//!
//! The controller runs its real event loop here, driven through the public
//! API with scripted backend/transport/runner collaborators. Time is paused,
//! so every timeout path runs deterministically and instantly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::timeout;

use vmlink::{
    AutomatedInteraction, CommandRunner, ConnectOptions, ConnectionSetup, Question, RunnerSink,
    SshAuth, SshError, SshErrorKind, SshParams, SshTransport, SshTransportFactory, Status,
    StatusSnapshot, Synchronization, Timeouts, TransportSink, TransportState, VmBackend,
    VmConnection, VmIdentity, VmInfo, VmProbe, VmRegistry, VmlinkResult,
};

const VM_NAME: &str = "build-engine";
const WAIT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// scripted collaborators
// ---------------------------------------------------------------------------

/// What the backend does when asked to start or stop the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnRequest {
    /// Honor the request (the next probe observes the change).
    Honor,
    /// Silently drop the request.
    Ignore,
}

struct ScriptedBackend {
    running: Arc<Mutex<bool>>,
    registered: bool,
    on_start: OnRequest,
    on_shut: OnRequest,
}

impl ScriptedBackend {
    fn new(running: bool) -> Self {
        Self {
            running: Arc::new(Mutex::new(running)),
            registered: true,
            on_start: OnRequest::Honor,
            on_shut: OnRequest::Honor,
        }
    }
}

#[async_trait]
impl VmBackend for ScriptedBackend {
    async fn start_virtual_machine(&self, _name: &str, _headless: bool) -> VmlinkResult<()> {
        if self.on_start == OnRequest::Honor {
            *self.running.lock() = true;
        }
        Ok(())
    }

    async fn shut_virtual_machine(&self, _name: &str) -> VmlinkResult<()> {
        if self.on_shut == OnRequest::Honor {
            *self.running.lock() = false;
        }
        Ok(())
    }

    async fn probe(&self, _name: &str) -> VmlinkResult<VmProbe> {
        Ok(VmProbe {
            running: *self.running.lock(),
            registered: self.registered,
        })
    }

    async fn fetch_info(&self, _name: &str) -> VmlinkResult<VmInfo> {
        Ok(VmInfo { headless: true })
    }
}

/// How a scripted transport reacts to a connect attempt.
#[derive(Debug, Clone)]
enum OnConnect {
    Succeed,
    Error(SshError),
    Silent,
}

struct ScriptedTransport {
    sink: TransportSink,
    on_connect: OnConnect,
    state: TransportState,
}

impl SshTransport for ScriptedTransport {
    fn connect_to_host(&mut self) {
        match &self.on_connect {
            OnConnect::Succeed => {
                self.state = TransportState::Connected;
                self.sink.connected();
            }
            OnConnect::Error(error) => {
                self.state = TransportState::Unconnected;
                self.sink.error(error.clone());
            }
            OnConnect::Silent => {
                self.state = TransportState::Connecting;
            }
        }
    }

    fn disconnect_from_host(&mut self) {
        self.state = TransportState::Unconnected;
        self.sink.disconnected();
    }

    fn state(&self) -> TransportState {
        self.state
    }
}

struct ScriptedFactory {
    on_connect: Mutex<OnConnect>,
}

impl ScriptedFactory {
    fn new(on_connect: OnConnect) -> Self {
        Self {
            on_connect: Mutex::new(on_connect),
        }
    }
}

impl SshTransportFactory for ScriptedFactory {
    fn create(&self, _params: &SshParams, sink: TransportSink) -> Box<dyn SshTransport> {
        Box::new(ScriptedTransport {
            sink,
            on_connect: self.on_connect.lock().clone(),
            state: TransportState::Unconnected,
        })
    }
}

/// How the scripted runner completes the remote shutdown command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnRun {
    Succeed,
    FailProcess,
    FailConnection,
}

struct ScriptedRunner {
    on_run: OnRun,
    commands: Arc<Mutex<Vec<String>>>,
    stop: Option<Arc<Mutex<bool>>>,
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &str, _params: &SshParams, sink: RunnerSink) {
        self.commands.lock().push(command.to_string());
        match self.on_run {
            OnRun::Succeed => {
                sink.process_started();
                // The guest honors the command before the channel drops.
                if let Some(running) = &self.stop {
                    *running.lock() = false;
                }
                sink.connection_error("connection closed by remote host".into());
            }
            OnRun::FailProcess => {
                sink.process_started();
                sink.process_closed(false, String::new(), "shutdown: not permitted".into());
            }
            OnRun::FailConnection => {
                sink.connection_error("connection refused".into());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// harness
// ---------------------------------------------------------------------------

struct Fixture {
    backend: Arc<ScriptedBackend>,
    factory: Arc<ScriptedFactory>,
    on_run: OnRun,
    runner_stops_vm: bool,
    interaction: AutomatedInteraction,
    registry: VmRegistry,
}

impl Fixture {
    fn new(vm_running: bool) -> Self {
        Self {
            backend: Arc::new(ScriptedBackend::new(vm_running)),
            factory: Arc::new(ScriptedFactory::new(OnConnect::Succeed)),
            on_run: OnRun::Succeed,
            runner_stops_vm: true,
            interaction: AutomatedInteraction::new(),
            registry: VmRegistry::new(),
        }
    }

    fn spawn(self) -> (VmConnection, Arc<Mutex<Vec<String>>>) {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let runner = Arc::new(ScriptedRunner {
            on_run: self.on_run,
            commands: Arc::clone(&commands),
            stop: self
                .runner_stops_vm
                .then(|| Arc::clone(&self.backend.running)),
        });

        let connection = VmConnection::new(ConnectionSetup {
            identity: identity(),
            backend: self.backend,
            transport_factory: self.factory,
            runner,
            interaction: Box::new(self.interaction),
            registry: self.registry,
            timeouts: Timeouts::default(),
        });
        (connection, commands)
    }
}

fn identity() -> VmIdentity {
    VmIdentity::new(
        VM_NAME,
        true,
        SshParams {
            host: "127.0.0.1".into(),
            port: 2222,
            username: "dev".into(),
            auth: SshAuth::KeyFile("/home/dev/.ssh/id_ed25519".into()),
            connect_timeout: Duration::from_secs(30),
        },
    )
}

async fn await_snapshot(
    connection: &VmConnection,
    predicate: impl FnMut(&StatusSnapshot) -> bool,
) -> StatusSnapshot {
    let mut rx = connection.subscribe();
    timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("condition not reached in time")
        .expect("controller gone")
        .clone()
}

// ---------------------------------------------------------------------------
// tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn blocking_connect_starts_vm_and_returns_true() {
    let (connection, _) = Fixture::new(false).spawn();

    assert!(connection.connect(ConnectOptions::blocking()).await);
    assert_eq!(connection.status(), Status::Connected);
    assert_eq!(connection.error_string(), None);
}

#[tokio::test(start_paused = true)]
async fn blocking_connect_fails_when_vm_never_starts() {
    let mut fixture = Fixture::new(false);
    Arc::get_mut(&mut fixture.backend).unwrap().on_start = OnRequest::Ignore;
    let (connection, _) = fixture.spawn();

    assert!(!connection.connect(ConnectOptions::blocking()).await);
    assert_eq!(connection.status(), Status::Error);

    let error = connection.error_string().expect("error string");
    assert!(error.contains(VM_NAME), "error should name the VM: {error}");
}

#[tokio::test(start_paused = true)]
async fn non_blocking_connect_reports_pending_settlement() {
    let (connection, _) = Fixture::new(false).spawn();

    assert!(!connection.connect(ConnectOptions::default()).await);

    let snapshot = await_snapshot(&connection, |s| s.status == Status::Connected).await;
    assert_eq!(snapshot.status, Status::Connected);

    // Now that the connection is up, connect() answers immediately.
    assert!(connection.connect(ConnectOptions::default()).await);
}

#[tokio::test(start_paused = true)]
async fn vm_started_outside_connects_automatically() {
    let (connection, _) = Fixture::new(true).spawn();

    let snapshot = await_snapshot(&connection, |s| s.status == Status::Connected).await;
    assert_eq!(snapshot.status, Status::Connected);

    let off = connection.is_virtual_machine_off().await;
    assert!(!off.off);
    assert!(off.started_outside);
    assert!(off.running_headless);
}

#[tokio::test(start_paused = true)]
async fn lock_down_soft_closes_through_the_guest() {
    let (connection, commands) = Fixture::new(true).spawn();
    await_snapshot(&connection, |s| s.status == Status::Connected).await;

    assert!(connection.lock_down(true).await);

    assert!(connection.is_virtual_machine_off().await.off);
    assert_eq!(commands.lock().as_slice(), ["sdk-shutdown"]);
    assert_eq!(connection.status(), Status::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn lock_down_escalates_when_remote_shutdown_fails() {
    let mut fixture = Fixture::new(true);
    fixture.on_run = OnRun::FailProcess;
    fixture.runner_stops_vm = false;
    let (connection, commands) = fixture.spawn();
    await_snapshot(&connection, |s| s.status == Status::Connected).await;

    // The guest refuses the shutdown command; the forced power-off still
    // brings the VM down before lock_down returns.
    assert!(connection.lock_down(true).await);
    assert!(connection.is_virtual_machine_off().await.off);
    assert_eq!(commands.lock().len(), 1);

    assert!(connection.lock_down(false).await);
}

#[tokio::test(start_paused = true)]
async fn abandoned_lock_down_returns_false() {
    let mut fixture = Fixture::new(true);
    fixture.on_run = OnRun::FailConnection;
    fixture.runner_stops_vm = false;
    Arc::get_mut(&mut fixture.backend).unwrap().on_shut = OnRequest::Ignore;
    let (connection, _) = fixture.spawn();
    await_snapshot(&connection, |s| s.status == Status::Connected).await;

    // Neither the guest command nor the forced power-off works, and the
    // automated interaction gives up rather than retrying forever.
    assert!(!connection.lock_down(true).await);

    let off = connection.is_virtual_machine_off().await;
    assert!(!off.off, "the VM could not be stopped");
    assert_eq!(connection.status(), Status::Disconnected);

    // The failed attempt left no pending request behind: a new lock-down
    // starts from scratch (and fails the same way).
    assert!(!connection.lock_down(true).await);
}

#[tokio::test(start_paused = true)]
async fn declined_close_leaves_outside_vm_running_unmanaged() {
    let mut fixture = Fixture::new(true);
    fixture.interaction = AutomatedInteraction::new().with_answer(Question::CloseVm, false);
    let (connection, commands) = fixture.spawn();
    await_snapshot(&connection, |s| s.status == Status::Connected).await;

    connection.disconnect();

    let snapshot = await_snapshot(&connection, |s| s.status == Status::Disconnected).await;
    assert_eq!(snapshot.status, Status::Disconnected);

    let off = connection.is_virtual_machine_off().await;
    assert!(!off.off, "declining the question must keep the VM running");
    assert!(off.started_outside);
    assert!(commands.lock().is_empty(), "no shutdown was sent to the guest");
}

#[tokio::test(start_paused = true)]
async fn disconnect_shuts_down_vm_started_by_us() {
    let (connection, commands) = Fixture::new(false).spawn();

    assert!(connection.connect(ConnectOptions::blocking()).await);
    connection.disconnect();

    await_snapshot(&connection, |s| s.status == Status::Disconnected && s.vm_off).await;
    assert!(connection.is_virtual_machine_off().await.off);
    assert_eq!(commands.lock().as_slice(), ["sdk-shutdown"]);
}

#[tokio::test(start_paused = true)]
async fn ssh_auth_failure_surfaces_as_error() {
    let mut fixture = Fixture::new(true);
    fixture.factory = Arc::new(ScriptedFactory::new(OnConnect::Error(SshError {
        kind: SshErrorKind::Authentication,
        message: "permission denied (publickey)".into(),
    })));
    let (connection, _) = fixture.spawn();

    let snapshot = await_snapshot(&connection, |s| s.status == Status::Error).await;
    let error = snapshot.error.expect("error string");
    assert!(error.contains(VM_NAME));
    assert!(error.contains("permission denied"));
}

#[tokio::test(start_paused = true)]
async fn refresh_synchronous_observes_outside_changes() {
    let fixture = Fixture::new(false);
    let running = Arc::clone(&fixture.backend.running);
    let (connection, _) = fixture.spawn();
    await_snapshot(&connection, |s| s.status == Status::Disconnected).await;

    // The VM comes up behind our back; a synchronous refresh sees it.
    *running.lock() = true;
    connection.refresh(Synchronization::Synchronous).await;

    assert!(!connection.is_virtual_machine_off().await.off);
}

#[tokio::test(start_paused = true)]
async fn registry_tracks_in_use_vm_names() {
    let registry = VmRegistry::new();

    let mut fixture = Fixture::new(false);
    fixture.registry = registry.clone();
    let (connection, _) = fixture.spawn();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(registry.names(), vec![VM_NAME]);

    connection.close();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(registry.names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn identity_is_replaceable() {
    let registry = VmRegistry::new();
    let mut fixture = Fixture::new(false);
    fixture.registry = registry.clone();
    let (connection, _) = fixture.spawn();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut replacement = identity();
    replacement.name = "device-emulator".into();
    connection.set_identity(replacement);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(registry.names(), vec!["device-emulator"]);
    assert_eq!(
        connection.identity().await.map(|identity| identity.name),
        Some("device-emulator".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn auto_connect_can_be_disabled() {
    let mut fixture = Fixture::new(true);
    fixture.factory = Arc::new(ScriptedFactory::new(OnConnect::Silent));
    let (connection, _) = fixture.spawn();

    connection.set_auto_connect_enabled(false);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(!connection.is_auto_connect_enabled().await);
    assert_ne!(connection.status(), Status::Connected);
}
