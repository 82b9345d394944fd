//! # Servers
//!
//! A [`Server`] is one managed backend instance: its synchronised definition,
//! its environment, its storage, and the per-server machinery (power lock,
//! event bus, sessions, background-work context) that the power controller
//! and the teardown coordinator drive.
//!
//! `Server` is a cheap handle around shared state; clones refer to the same
//! server, which is what lets a request handler return immediately while a
//! spawned task carries out the power action.

pub mod config;
pub mod events;
pub mod sessions;

pub use config::*;
pub use events::{Event, EventBus};
pub use sessions::{Session, SessionBag};

use crate::config::Config;
use crate::configfiles;
use crate::environment::{Environment, EnvironmentSettings};
use crate::filesystem::Filesystem;
use crate::power::PowerLock;
use crate::remote::{RemoteClient, RemoteError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Collaborators a server is built from.
#[derive(Clone)]
pub struct ServerServices {
    pub environment: Arc<dyn Environment>,
    pub filesystem: Arc<dyn Filesystem>,
    pub remote: Arc<dyn RemoteClient>,
    pub config: Arc<Config>,
}

struct Inner {
    id: ServerId,
    config: RwLock<ServerConfig>,
    installing: AtomicBool,
    transferring: AtomicBool,
    restoring: AtomicBool,
    power_lock: PowerLock,
    events: EventBus,
    sessions: SessionBag,
    ctx: CancellationToken,
    services: ServerServices,
}

#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    pub fn new(config: ServerConfig, services: ServerServices) -> Self {
        services.filesystem.set_disk_limit(config.build.disk_space);
        Self {
            inner: Arc::new(Inner {
                id: config.uuid,
                config: RwLock::new(config),
                installing: AtomicBool::new(false),
                transferring: AtomicBool::new(false),
                restoring: AtomicBool::new(false),
                power_lock: PowerLock::new(),
                events: EventBus::new(),
                sessions: SessionBag::new(),
                ctx: CancellationToken::new(),
                services,
            }),
        }
    }

    pub fn id(&self) -> ServerId {
        self.inner.id
    }

    /// A snapshot of the current definition.
    pub fn config(&self) -> ServerConfig {
        self.inner.config.read().clone()
    }

    /// The daemon-wide configuration this server was built with.
    pub fn daemon_config(&self) -> &Config {
        &self.inner.services.config
    }

    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.inner.services.environment
    }

    pub fn filesystem(&self) -> &Arc<dyn Filesystem> {
        &self.inner.services.filesystem
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn sessions(&self) -> &SessionBag {
        &self.inner.sessions
    }

    pub(crate) fn power_lock(&self) -> &PowerLock {
        &self.inner.power_lock
    }

    /// Token for background work scoped to this server, such as installs.
    /// Cancelled when the server is deleted.
    pub fn context(&self) -> CancellationToken {
        self.inner.ctx.child_token()
    }

    pub(crate) fn cancel_context(&self) {
        self.inner.ctx.cancel();
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.config.read().suspended
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.inner.config.write().suspended = suspended;
    }

    pub fn is_installing(&self) -> bool {
        self.inner.installing.load(Ordering::SeqCst)
    }

    pub fn set_installing(&self, value: bool) {
        self.inner.installing.store(value, Ordering::SeqCst);
    }

    pub fn is_transferring(&self) -> bool {
        self.inner.transferring.load(Ordering::SeqCst)
    }

    pub fn set_transferring(&self, value: bool) {
        self.inner.transferring.store(value, Ordering::SeqCst);
    }

    pub fn is_restoring(&self) -> bool {
        self.inner.restoring.load(Ordering::SeqCst)
    }

    pub fn set_restoring(&self, value: bool) {
        self.inner.restoring.store(value, Ordering::SeqCst);
    }

    /// Disk limit in MiB. Zero or less means unlimited.
    pub fn disk_space(&self) -> i64 {
        self.inner.config.read().build.disk_space
    }

    /// Pulls the authoritative definition from the control plane and applies it.
    pub async fn sync(&self) -> Result<(), RemoteError> {
        let config = self
            .inner
            .services
            .remote
            .get_server_configuration(self.id())
            .await?;
        if config.uuid != self.id() {
            return Err(RemoteError::Request(format!(
                "control plane returned definition for {} instead of {}",
                config.uuid,
                self.id()
            )));
        }
        self.filesystem().set_disk_limit(config.build.disk_space);
        *self.inner.config.write() = config;
        Ok(())
    }

    /// Pushes the current variables and limits into the environment.
    pub fn sync_with_environment(&self) {
        let settings = {
            let config = self.inner.config.read();
            let mut variables = config.environment.clone();
            variables.insert("STARTUP".to_string(), config.invocation.clone());
            variables.insert("SERVER_MEMORY".to_string(), config.build.memory_limit.to_string());
            variables.insert("SERVER_UUID".to_string(), config.uuid.to_string());
            EnvironmentSettings {
                invocation: config.invocation.clone(),
                variables,
                memory_limit: config.build.memory_limit,
                cpu_limit: config.build.cpu_limit,
            }
        };
        self.environment().apply_settings(settings);
    }

    /// Regenerates the process configuration files. Failures are logged, never returned.
    pub async fn update_configuration_files(&self) {
        let (files, variables) = {
            let config = self.inner.config.read();
            (config.config_files.clone(), config.environment.clone())
        };
        let failures = configfiles::update_all(&self.filesystem().path(), &files, &variables).await;
        for e in failures {
            warn!(server = %self.id(), error = %e, "failed to update process configuration file");
        }
    }

    /// Shows a message from the daemon in the server console.
    pub fn publish_daemon_message(&self, message: impl Into<String>) {
        let message = message.into();
        info!(server = %self.id(), %message, "daemon message");
        self.events().publish(Event::DaemonMessage(message));
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("id", &self.inner.id).finish()
    }
}
