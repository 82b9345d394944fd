//! # Mock Collaborators
//!
//! In-memory stand-ins for the traits a [`Server`] is built from, for testing
//! the power controller, the pre-boot pipeline and teardown without real
//! processes or disks.
//!
//! Every mock writes to a shared [`CallLog`], so a test can assert the order
//! in which collaborators were reached across all of them.
//!
//! ```ignore
//! let mocks = MockServices::new(ServerConfig::new(ServerId::new_v4()));
//! mocks.environment.expect_start().return_err(EnvironmentError::Other("boom".into()));
//!
//! let server = mocks.server(Config::default());
//! server.handle_power_action(PowerAction::Start, None).await.unwrap_err();
//!
//! assert!(mocks.log.called_before("remote.sync", "environment.start"));
//! mocks.environment.verify();
//! ```
//!
//! Calls without a queued expectation succeed. A [`Gate`] attached to an
//! expectation holds the call until the test opens it, which is how tests
//! keep a power action in flight.

use crate::config::Config;
use crate::environment::{Environment, EnvironmentError, EnvironmentSettings, ProcessState, Signal};
use crate::filesystem::{Filesystem, FilesystemError};
use crate::install::{InstallError, Installer};
use crate::remote::{RemoteClient, RemoteError};
use crate::server::{Server, ServerConfig, ServerId, ServerServices};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

// =============================================================================
// CALL LOG
// =============================================================================

/// Ordered record of collaborator calls, shared between mocks.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn contains(&self, call: &str) -> bool {
        self.count(call) > 0
    }

    /// Index of the first occurrence of `call`.
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    /// True when both were called and the first `first` precedes the first `second`.
    pub fn called_before(&self, first: &str, second: &str) -> bool {
        matches!((self.position(first), self.position(second)), (Some(a), Some(b)) if a < b)
    }
}

// =============================================================================
// GATES
// =============================================================================

/// Holds a mocked call until the test opens it.
#[derive(Clone, Default)]
pub struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a mocked call has reached the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets the call through.
    pub fn open(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Method {
    Start,
    WaitForStop,
    Terminate,
    Destroy,
    SendCommand,
}

struct Expectation {
    gate: Option<Gate>,
    response: Result<(), EnvironmentError>,
}

type Expectations = Arc<Mutex<HashMap<Method, VecDeque<Expectation>>>>;

/// A scripted [`Environment`].
///
/// A successful start moves the state to running; a successful stop,
/// terminate or destroy moves it to offline.
pub struct MockEnvironment {
    state: Mutex<ProcessState>,
    expectations: Expectations,
    settings: Mutex<Option<EnvironmentSettings>>,
    commands: Mutex<Vec<String>>,
    log: CallLog,
}

impl MockEnvironment {
    pub fn new(log: CallLog) -> Self {
        Self {
            state: Mutex::new(ProcessState::Offline),
            expectations: Arc::default(),
            settings: Mutex::new(None),
            commands: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn set_state(&self, state: ProcessState) {
        *self.state.lock() = state;
    }

    /// Settings from the latest `apply_settings` call.
    pub fn settings(&self) -> Option<EnvironmentSettings> {
        self.settings.lock().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn expect_start(&self) -> ExpectationBuilder {
        self.builder(Method::Start)
    }

    pub fn expect_wait_for_stop(&self) -> ExpectationBuilder {
        self.builder(Method::WaitForStop)
    }

    pub fn expect_terminate(&self) -> ExpectationBuilder {
        self.builder(Method::Terminate)
    }

    pub fn expect_destroy(&self) -> ExpectationBuilder {
        self.builder(Method::Destroy)
    }

    pub fn expect_send_command(&self) -> ExpectationBuilder {
        self.builder(Method::SendCommand)
    }

    /// Panics if any queued expectation was not consumed.
    pub fn verify(&self) {
        let remaining: usize = self.expectations.lock().values().map(VecDeque::len).sum();
        if remaining != 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }

    fn builder(&self, method: Method) -> ExpectationBuilder {
        ExpectationBuilder {
            method,
            gate: None,
            expectations: self.expectations.clone(),
        }
    }

    async fn call(&self, method: Method, name: &str) -> Result<(), EnvironmentError> {
        self.log.record(name);
        let expectation = self
            .expectations
            .lock()
            .get_mut(&method)
            .and_then(VecDeque::pop_front);
        let Some(expectation) = expectation else {
            return Ok(());
        };
        if let Some(gate) = expectation.gate {
            gate.pass().await;
        }
        expectation.response
    }
}

/// Builder for environment expectations.
pub struct ExpectationBuilder {
    method: Method,
    gate: Option<Gate>,
    expectations: Expectations,
}

impl ExpectationBuilder {
    /// Holds the call at `gate` before responding.
    pub fn with_gate(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    pub fn return_ok(self) {
        self.push(Ok(()));
    }

    pub fn return_err(self, error: EnvironmentError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<(), EnvironmentError>) {
        self.expectations
            .lock()
            .entry(self.method)
            .or_default()
            .push_back(Expectation {
                gate: self.gate,
                response,
            });
    }
}

#[async_trait]
impl Environment for MockEnvironment {
    fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    async fn start(&self) -> Result<(), EnvironmentError> {
        self.call(Method::Start, "environment.start").await?;
        self.set_state(ProcessState::Running);
        Ok(())
    }

    async fn wait_for_stop(&self, _timeout: Duration, _terminate: bool) -> Result<(), EnvironmentError> {
        self.call(Method::WaitForStop, "environment.wait_for_stop").await?;
        self.set_state(ProcessState::Offline);
        Ok(())
    }

    async fn terminate(&self, _signal: Signal) -> Result<(), EnvironmentError> {
        self.call(Method::Terminate, "environment.terminate").await?;
        self.set_state(ProcessState::Offline);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), EnvironmentError> {
        self.call(Method::Destroy, "environment.destroy").await?;
        self.set_state(ProcessState::Offline);
        Ok(())
    }

    async fn send_command(&self, command: &str) -> Result<(), EnvironmentError> {
        self.call(Method::SendCommand, "environment.send_command").await?;
        self.commands.lock().push(command.to_string());
        Ok(())
    }

    fn apply_settings(&self, settings: EnvironmentSettings) {
        self.log.record("environment.apply_settings");
        *self.settings.lock() = Some(settings);
    }
}

// =============================================================================
// CONTROL PLANE
// =============================================================================

/// A [`RemoteClient`] serving one mutable definition.
pub struct MockRemote {
    config: Mutex<ServerConfig>,
    failure: Mutex<Option<RemoteError>>,
    log: CallLog,
}

impl MockRemote {
    pub fn new(config: ServerConfig, log: CallLog) -> Self {
        Self {
            config: Mutex::new(config),
            failure: Mutex::new(None),
            log,
        }
    }

    /// Changes the definition returned by later syncs.
    pub fn update(&self, f: impl FnOnce(&mut ServerConfig)) {
        f(&mut self.config.lock());
    }

    /// Makes the next sync fail with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        *self.failure.lock() = Some(error);
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn get_server_configuration(&self, id: ServerId) -> Result<ServerConfig, RemoteError> {
        self.log.record("remote.sync");
        if let Some(error) = self.failure.lock().take() {
            return Err(error);
        }
        let config = self.config.lock().clone();
        if config.uuid != id {
            return Err(RemoteError::NotFound(id));
        }
        Ok(config)
    }
}

// =============================================================================
// FILESYSTEM
// =============================================================================

/// A [`Filesystem`] with switchable outcomes.
pub struct MockFilesystem {
    root: PathBuf,
    limit: AtomicI64,
    has_space: AtomicBool,
    chown_failure: Mutex<Option<FilesystemError>>,
    space_gate: Mutex<Option<Gate>>,
    log: CallLog,
}

impl MockFilesystem {
    pub fn new(root: impl Into<PathBuf>, log: CallLog) -> Self {
        Self {
            root: root.into(),
            limit: AtomicI64::new(0),
            has_space: AtomicBool::new(true),
            chown_failure: Mutex::new(None),
            space_gate: Mutex::new(None),
            log,
        }
    }

    pub fn disk_limit(&self) -> i64 {
        self.limit.load(Ordering::SeqCst)
    }

    /// Makes the space checks report the limit as exceeded.
    pub fn set_out_of_space(&self) {
        self.has_space.store(false, Ordering::SeqCst);
    }

    pub fn fail_next_chown(&self, error: FilesystemError) {
        *self.chown_failure.lock() = Some(error);
    }

    /// Holds the next `has_space_available` call at `gate`.
    pub fn gate_space_recalculation(&self, gate: &Gate) {
        *self.space_gate.lock() = Some(gate.clone());
    }
}

#[async_trait]
impl Filesystem for MockFilesystem {
    fn path(&self) -> PathBuf {
        self.root.clone()
    }

    fn set_disk_limit(&self, limit_mib: i64) {
        self.limit.store(limit_mib, Ordering::SeqCst);
    }

    async fn has_space_available(&self, force: bool) -> bool {
        self.log.record(if force {
            "filesystem.has_space_available(force)"
        } else {
            "filesystem.has_space_available"
        });
        let gate = self.space_gate.lock().take();
        if let Some(gate) = gate {
            gate.pass().await;
            self.log.record("filesystem.has_space_available.done");
        }
        self.has_space.load(Ordering::SeqCst)
    }

    async fn has_space_err(&self, _force: bool) -> Result<(), FilesystemError> {
        self.log.record("filesystem.has_space_err");
        if self.has_space.load(Ordering::SeqCst) {
            Ok(())
        } else {
            let limit = u64::try_from(self.disk_limit().max(0)).unwrap_or_default() * 1024 * 1024;
            Err(FilesystemError::DiskSpaceExceeded { used: limit, limit })
        }
    }

    async fn chown(&self, _path: &Path) -> Result<(), FilesystemError> {
        self.log.record("filesystem.chown");
        match self.chown_failure.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// =============================================================================
// INSTALLER
// =============================================================================

/// An [`Installer`] that optionally waits at a gate and then succeeds or fails.
pub struct MockInstaller {
    gate: Mutex<Option<Gate>>,
    failure: Mutex<Option<InstallError>>,
    log: CallLog,
}

impl MockInstaller {
    pub fn new(log: CallLog) -> Self {
        Self {
            gate: Mutex::new(None),
            failure: Mutex::new(None),
            log,
        }
    }

    pub fn with_gate(self, gate: &Gate) -> Self {
        *self.gate.lock() = Some(gate.clone());
        self
    }

    pub fn fail_next(&self, error: InstallError) {
        *self.failure.lock() = Some(error);
    }
}

#[async_trait]
impl Installer for MockInstaller {
    async fn install(&self, _server: &Server, reinstall: bool) -> Result<(), InstallError> {
        self.log.record(if reinstall { "installer.reinstall" } else { "installer.install" });
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        match self.failure.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// =============================================================================
// WIRING
// =============================================================================

/// One set of mocks sharing a [`CallLog`], ready to build a [`Server`] from.
pub struct MockServices {
    pub config: ServerConfig,
    pub environment: Arc<MockEnvironment>,
    pub remote: Arc<MockRemote>,
    pub filesystem: Arc<MockFilesystem>,
    pub log: CallLog,
}

impl MockServices {
    /// Mocks for a server whose control plane serves `config`.
    ///
    /// The filesystem root is a path that does not exist; use
    /// [`MockServices::with_root`] when a test needs real files.
    pub fn new(config: ServerConfig) -> Self {
        let root = std::env::temp_dir().join(format!("node-agent-mock-{}", config.uuid));
        Self::with_root(config, root)
    }

    pub fn with_root(config: ServerConfig, root: impl Into<PathBuf>) -> Self {
        let log = CallLog::new();
        Self {
            environment: Arc::new(MockEnvironment::new(log.clone())),
            remote: Arc::new(MockRemote::new(config.clone(), log.clone())),
            filesystem: Arc::new(MockFilesystem::new(root, log.clone())),
            config,
            log,
        }
    }

    pub fn server(&self, daemon: Config) -> Server {
        Server::new(
            self.config.clone(),
            ServerServices {
                environment: self.environment.clone(),
                filesystem: self.filesystem.clone(),
                remote: self.remote.clone(),
                config: Arc::new(daemon),
            },
        )
    }

    pub fn installer(&self) -> MockInstaller {
        MockInstaller::new(self.log.clone())
    }
}
