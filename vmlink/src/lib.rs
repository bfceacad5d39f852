//! vmlink - connection controller for development virtual machines.
//!
//! Packaging and deployment toolchains work against a build engine or device
//! emulator running in a VM, reached over SSH. This crate decides *when* to
//! boot, shut down, lock down, and reconnect that VM and its SSH channel:
//! a pair of coupled state machines merging process events, poll results,
//! timer expiries, and user answers into one race-free decision process.
//!
//! The crate is a pure in-process coordinator. The actual hypervisor, SSH
//! implementation, remote command execution, and user interface are
//! collaborators injected through traits ([`VmBackend`],
//! [`SshTransportFactory`], [`CommandRunner`], [`InteractionHandler`]).
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # async fn example(
//! #     backend: Arc<dyn vmlink::VmBackend>,
//! #     factory: Arc<dyn vmlink::SshTransportFactory>,
//! #     runner: Arc<dyn vmlink::CommandRunner>,
//! # ) {
//! use vmlink::{
//!     AutomatedInteraction, ConnectOptions, ConnectionSetup, SshAuth, SshParams, Timeouts,
//!     VmConnection, VmIdentity, VmRegistry,
//! };
//!
//! let identity = VmIdentity::new(
//!     "build-engine",
//!     true,
//!     SshParams {
//!         host: "127.0.0.1".into(),
//!         port: 2222,
//!         username: "dev".into(),
//!         auth: SshAuth::Password("dev".into()),
//!         connect_timeout: Duration::from_secs(30),
//!     },
//! );
//!
//! let connection = VmConnection::new(ConnectionSetup {
//!     identity,
//!     backend,
//!     transport_factory: factory,
//!     runner,
//!     interaction: Box::new(AutomatedInteraction::new()),
//!     registry: VmRegistry::new(),
//!     timeouts: Timeouts::default(),
//! });
//!
//! if connection.connect(ConnectOptions::blocking()).await {
//!     println!("connected");
//! }
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod connection;
pub mod interaction;
pub mod logging;
pub mod registry;
pub mod remote;
pub mod transport;

mod error;

pub use backend::{VmBackend, VmInfo, VmProbe};
pub use config::{SshAuth, SshParams, Timeouts, VmIdentity, DEFAULT_SHUTDOWN_COMMAND};
pub use connection::{
    ConnectOptions, ConnectionSetup, SshState, Status, StatusSnapshot, Synchronization,
    VmConnection, VmOffInfo, VmState,
};
pub use error::{VmlinkError, VmlinkResult};
pub use interaction::{
    AutomatedInteraction, InteractionHandler, Question, QuestionNotifier, QuestionStatus, Warning,
};
pub use registry::VmRegistry;
pub use remote::{CommandRunner, RemoteShutdown, RunnerEvent, RunnerSink, ShutdownOutcome};
pub use transport::{
    SshError, SshErrorKind, SshTransport, SshTransportFactory, TransportEvent, TransportSink,
    TransportState,
};
