//! Error types for server environments.

use super::Signal;
use thiserror::Error;

/// Errors reported by an [`Environment`](super::Environment) implementation.
///
/// These are passed through the power controller unmodified, so callers see
/// exactly what the backend runtime reported.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// The process is already running and cannot be started again.
    #[error("server process is already running")]
    AlreadyRunning,

    /// The process is not running, so it cannot receive input.
    #[error("server process is not running")]
    NotRunning,

    /// The process did not reach the offline state in time and was not terminated.
    #[error("server process did not stop within {0} seconds")]
    StopTimeout(u64),

    /// The environment was destroyed and can no longer be used.
    #[error("server environment has been destroyed")]
    Destroyed,

    /// The environment cannot deliver this signal.
    #[error("signal {0} is not supported by this environment")]
    UnsupportedSignal(Signal),

    /// The startup invocation is empty.
    #[error("server has no startup invocation configured")]
    MissingInvocation,

    /// An I/O failure while spawning, signalling or talking to the process.
    #[error("environment I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend-specific failure.
    #[error("environment error: {0}")]
    Other(String),
}
