//! Server installation.
//!
//! What an install actually does (pulling images, running an install script)
//! is up to the [`Installer`]. The server only guarantees that the
//! `installing` flag is set for exactly as long as the installer runs, which
//! is what keeps power actions out while it does.

use crate::environment::{EnvironmentError, ProcessState};
use crate::server::{Event, Server};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How long a reinstall waits for a running server to stop.
const REINSTALL_STOP_TIMEOUT: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("server is already installing")]
    AlreadyInstalling,

    #[error("installation was cancelled")]
    Cancelled,

    #[error("installation failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

#[async_trait]
pub trait Installer: Send + Sync + 'static {
    async fn install(&self, server: &Server, reinstall: bool) -> Result<(), InstallError>;
}

/// Runs the definition's `install_script` with `sh` inside the data directory.
///
/// A definition without a script installs nothing and succeeds.
#[derive(Debug, Default, Clone)]
pub struct ScriptInstaller;

#[async_trait]
impl Installer for ScriptInstaller {
    async fn install(&self, server: &Server, _reinstall: bool) -> Result<(), InstallError> {
        let config = server.config();
        let Some(script) = config.install_script.filter(|s| !s.trim().is_empty()) else {
            debug!(server = %server.id(), "no install script, nothing to do");
            return Ok(());
        };
        let root = server.filesystem().path();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(EnvironmentError::from)?;

        let output = Command::new("sh")
            .arg("-c")
            .arg(&script)
            .current_dir(&root)
            .envs(&config.environment)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(EnvironmentError::from)?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(server = %server.id(), %line, "install");
        }
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(InstallError::Failed(format!("{}: {}", output.status, stderr.trim())))
        }
    }
}

/// Clears the installing flag on every exit path.
struct InstallingGuard<'a>(&'a Server);

impl Drop for InstallingGuard<'_> {
    fn drop(&mut self) {
        self.0.set_installing(false);
    }
}

impl Server {
    /// Runs `installer` with the `installing` flag set.
    ///
    /// A reinstall stops the server first. The install is abandoned when the
    /// server's background context is cancelled.
    pub async fn install(&self, installer: &dyn Installer, reinstall: bool) -> Result<(), InstallError> {
        if self.is_installing() {
            return Err(InstallError::AlreadyInstalling);
        }
        if reinstall && self.environment().state() != ProcessState::Offline {
            self.environment()
                .wait_for_stop(REINSTALL_STOP_TIMEOUT, true)
                .await?;
        }

        self.set_installing(true);
        let _guard = InstallingGuard(self);
        self.events().publish(Event::InstallStarted);
        info!(server = %self.id(), reinstall, "starting installation");

        let ctx = self.context();
        let result = tokio::select! {
            result = installer.install(self, reinstall) => result,
            _ = ctx.cancelled() => Err(InstallError::Cancelled),
        };

        match &result {
            Ok(()) => info!(server = %self.id(), "installation completed"),
            Err(e) => warn!(server = %self.id(), error = %e, "installation failed"),
        }
        self.events().publish(Event::InstallCompleted {
            successful: result.is_ok(),
        });
        result
    }
}
