//! Error types for power actions.

use crate::environment::EnvironmentError;
use crate::filesystem::FilesystemError;
use crate::remote::RemoteError;
use thiserror::Error;

/// The power lock was not obtained within the allowed time.
///
/// Kept as its own type so that callers can tell lock contention apart from
/// failures of the action itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("context deadline exceeded")]
pub struct DeadlineExceeded;

/// Errors that can occur while handling a power action.
#[derive(Debug, Error)]
pub enum PowerError {
    #[error("server is currently installing")]
    Installing,

    #[error("server is currently being transferred")]
    Transferring,

    #[error("server is currently being restored from a backup")]
    Restoring,

    #[error("could not acquire lock on power state")]
    LockTimeout(#[source] DeadlineExceeded),

    #[error("server is already running")]
    AlreadyRunning,

    #[error("server is suspended")]
    Suspended,

    #[error("unable to sync server data from the control plane")]
    SyncFailed(#[source] RemoteError),

    #[error("not enough disk space to start the server")]
    DiskSpaceExceeded(#[source] FilesystemError),

    #[error("failed to chown root server directory during pre-boot process")]
    Permission(#[source] FilesystemError),

    #[error("attempting to handle unknown power action {0:?}")]
    UnknownAction(String),

    /// Reported by the environment and passed through unmodified.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

impl PowerError {
    /// True when the action never ran because the power lock was busy.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, PowerError::LockTimeout(_))
    }
}
