//! # Server Environments
//!
//! An environment is the runtime that actually executes a server's workload:
//! a container, a VM, or a plain child process. The power controller never
//! talks to a process directly; it drives the [`Environment`] trait and treats
//! every implementation the same way.
//!
//! - [`process`] - a child-process environment used by the bundled binary
//! - [`error`] - [`EnvironmentError`], passed through to callers unmodified

pub mod error;
pub mod process;

pub use error::*;
pub use process::ProcessEnvironment;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::time::Duration;

/// The observable state of a server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Offline,
    Starting,
    Running,
    Stopping,
}

impl Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Offline => "offline",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Signals that can be delivered through [`Environment::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Immediate, uncatchable termination.
    Kill,
    /// Polite termination request.
    Terminate,
}

impl Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Kill => f.write_str("SIGKILL"),
            Signal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Runtime settings pushed from the server definition into the environment
/// before every boot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentSettings {
    pub invocation: String,
    pub variables: HashMap<String, String>,
    pub memory_limit: i64,
    pub cpu_limit: i64,
}

/// The backend runtime for a single server.
///
/// Implementations must be safe to call concurrently: the power controller
/// serialises start/stop/restart, but [`Environment::terminate`] deliberately
/// bypasses that exclusivity and may run while another action is in flight.
#[async_trait]
pub trait Environment: Send + Sync + 'static {
    /// Current process state.
    fn state(&self) -> ProcessState;

    /// Starts the process. Must only be called while the state is offline.
    async fn start(&self) -> Result<(), EnvironmentError>;

    /// Asks the process to stop and waits up to `timeout` for it to go offline.
    ///
    /// When `terminate` is set and the timeout elapses, the process is killed
    /// and the result of that kill is returned.
    async fn wait_for_stop(&self, timeout: Duration, terminate: bool) -> Result<(), EnvironmentError>;

    /// Delivers `signal` to the process without waiting for a graceful stop.
    async fn terminate(&self, signal: Signal) -> Result<(), EnvironmentError>;

    /// Stops the process if needed and removes the environment itself.
    async fn destroy(&self) -> Result<(), EnvironmentError>;

    /// Writes a line of input to the running process.
    async fn send_command(&self, command: &str) -> Result<(), EnvironmentError>;

    /// Replaces the runtime settings used for the next boot.
    fn apply_settings(&self, settings: EnvironmentSettings);

    fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }
}
