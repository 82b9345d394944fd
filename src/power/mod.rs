//! # Power Actions
//!
//! Start, stop, restart and terminate for a single server, serialised by a
//! per-server [`PowerLock`].
//!
//! Terminate is the escape hatch: it never waits for the lock, so a server
//! stuck in a long stop can still be killed.

pub mod error;
pub mod lock;
pub mod preboot;

pub use error::*;
pub use lock::PowerLock;

use crate::environment::{ProcessState, Signal};
use crate::server::Server;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// How long a stop may take before the process is killed.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// A lifecycle transition requested for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum PowerAction {
    Start,
    Stop,
    Restart,
    #[serde(rename = "kill")]
    Terminate,
}

impl PowerAction {
    /// Start and restart both boot the server and go through pre-boot.
    pub fn is_start(&self) -> bool {
        matches!(self, PowerAction::Start | PowerAction::Restart)
    }
}

impl Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerAction::Start => "start",
            PowerAction::Stop => "stop",
            PowerAction::Restart => "restart",
            PowerAction::Terminate => "kill",
        };
        f.write_str(s)
    }
}

impl FromStr for PowerAction {
    type Err = PowerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(PowerAction::Start),
            "stop" => Ok(PowerAction::Stop),
            "restart" => Ok(PowerAction::Restart),
            "kill" => Ok(PowerAction::Terminate),
            other => Err(PowerError::UnknownAction(other.to_string())),
        }
    }
}

impl TryFrom<String> for PowerAction {
    type Error = PowerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Server {
    /// Runs `action` against this server's environment.
    ///
    /// Every action except [`PowerAction::Terminate`] needs the power lock.
    /// With a positive `wait` the call waits up to that long for it; with no
    /// wait (or zero) it makes one attempt and fails with
    /// [`PowerError::LockTimeout`] if another action is running.
    pub async fn handle_power_action(&self, action: PowerAction, wait: Option<Duration>) -> Result<(), PowerError> {
        if self.is_installing() {
            return Err(PowerError::Installing);
        }
        if self.is_transferring() {
            return Err(PowerError::Transferring);
        }
        if self.is_restoring() {
            return Err(PowerError::Restoring);
        }

        let lock = self.power_lock();
        let _permit = if action == PowerAction::Terminate {
            // Held if free, skipped if not.
            lock.try_acquire()
        } else {
            match wait.filter(|w| !w.is_zero()) {
                Some(wait) => Some(lock.acquire_timeout(wait).await.map_err(PowerError::LockTimeout)?),
                None => Some(lock.try_acquire().ok_or(PowerError::LockTimeout(DeadlineExceeded))?),
            }
        };
        debug!(server = %self.id(), %action, "acquired power lock");

        let environment = self.environment();
        match action {
            PowerAction::Start => {
                if environment.state() != ProcessState::Offline {
                    return Err(PowerError::AlreadyRunning);
                }
                self.on_before_start().await?;
                environment.start().await?;
            }
            PowerAction::Stop => {
                environment.wait_for_stop(STOP_TIMEOUT, true).await?;
            }
            PowerAction::Restart => {
                environment.wait_for_stop(STOP_TIMEOUT, true).await?;
                self.on_before_start().await?;
                environment.start().await?;
            }
            PowerAction::Terminate => {
                environment.terminate(Signal::Kill).await?;
            }
        }
        info!(server = %self.id(), %action, "power action completed");
        Ok(())
    }

    /// Whether a power action currently holds the lock.
    ///
    /// Advisory only: the answer may be stale as soon as it is returned.
    pub fn executing_power_action(&self) -> bool {
        self.power_lock().is_held()
    }
}
