use super::{ApiError, PowerRequest};
use crate::config::Config;
use crate::install::Installer;
use crate::power::{PowerAction, PowerError};
use crate::registry::ManagerClient;
use crate::server::{Event, Server, ServerId};
use crate::teardown::TeardownCoordinator;
use crate::tokens::DenyList;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Request handlers over the node's shared services.
#[derive(Clone)]
pub struct Handlers {
    manager: ManagerClient,
    teardown: TeardownCoordinator,
    deny_list: Arc<DenyList>,
    installer: Arc<dyn Installer>,
    config: Arc<Config>,
}

impl Handlers {
    pub fn new(
        manager: ManagerClient,
        teardown: TeardownCoordinator,
        deny_list: Arc<DenyList>,
        installer: Arc<dyn Installer>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            manager,
            teardown,
            deny_list,
            installer,
            config,
        }
    }

    /// Looks up a registered server.
    pub async fn server(&self, id: ServerId) -> Result<Server, ApiError> {
        self.manager.get(id).await?.ok_or(ApiError::NotFound(id))
    }

    /// Validates a lifecycle request and dispatches it in the background.
    #[instrument(skip_all, fields(server = %server.id(), action = %request.action))]
    pub async fn post_power(&self, server: &Server, request: PowerRequest) -> Result<JoinHandle<()>, ApiError> {
        let action: PowerAction = request
            .action
            .parse()
            .map_err(|e: PowerError| ApiError::UnprocessableEntity(e.to_string()))?;

        if action.is_start() && server.is_suspended() {
            return Err(ApiError::BadRequest(
                "Cannot start or restart a server that is suspended.".into(),
            ));
        }

        let wait = request
            .wait_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.power_lock_wait());
        debug!(wait_secs = wait.as_secs(), "dispatching power action");
        Ok(dispatch_power_action(server.clone(), action, wait))
    }

    /// Sends console commands to a running server.
    #[instrument(skip_all, fields(server = %server.id(), count = commands.len()))]
    pub async fn send_commands(&self, server: &Server, commands: Vec<String>) -> Result<(), ApiError> {
        if !server.environment().is_running() {
            return Err(ApiError::BadGateway(
                "Cannot send commands to a stopped server instance.".into(),
            ));
        }
        for command in commands {
            if let Err(e) = server.environment().send_command(&command).await {
                warn!(%command, error = %e, "failed to send command to server instance");
            }
        }
        Ok(())
    }

    /// Runs the installer in the background.
    #[instrument(skip_all, fields(server = %server.id()))]
    pub async fn install(&self, server: &Server) -> Result<JoinHandle<()>, ApiError> {
        Ok(self.spawn_install(server.clone(), false))
    }

    /// Reinstalls in the background, unless a power action is in progress.
    #[instrument(skip_all, fields(server = %server.id()))]
    pub async fn reinstall(&self, server: &Server) -> Result<JoinHandle<()>, ApiError> {
        if server.executing_power_action() {
            return Err(ApiError::Conflict(
                "Cannot execute server reinstall event while another power action is running.".into(),
            ));
        }
        Ok(self.spawn_install(server.clone(), true))
    }

    /// Registers a new server and installs it in the background, starting it
    /// afterwards when its definition asks for that.
    #[instrument(skip_all, fields(server = %server.id()))]
    pub async fn create_server(&self, server: Server) -> Result<JoinHandle<()>, ApiError> {
        self.manager.add(server.clone()).await?;

        let installer = self.installer.clone();
        let wait = self.config.power_lock_wait();
        Ok(tokio::spawn(async move {
            if let Err(e) = server.install(installer.as_ref(), false).await {
                error!(server = %server.id(), error = %e, "failed to run install process for server");
                return;
            }
            if server.config().start_on_completion {
                info!(server = %server.id(), "starting server after installation");
                if let Err(e) = server.handle_power_action(PowerAction::Start, Some(wait)).await {
                    report_failure(&server, PowerAction::Start, &e);
                }
            }
        }))
    }

    /// Deletes a server. Once this returns the server can no longer be looked up.
    #[instrument(skip(self))]
    pub async fn delete_server(&self, id: ServerId) -> Result<JoinHandle<()>, ApiError> {
        let server = self.server(id).await?;
        Ok(self.teardown.delete(&server).await?)
    }

    /// Revokes every token issued so far under each of `jtis`.
    #[instrument(skip_all, fields(count = jtis.len()))]
    pub fn deny_tokens(&self, jtis: Vec<String>) {
        for jti in jtis {
            self.deny_list.deny(jti);
        }
    }

    fn spawn_install(&self, server: Server, reinstall: bool) -> JoinHandle<()> {
        let installer = self.installer.clone();
        tokio::spawn(async move {
            if let Err(e) = server.install(installer.as_ref(), reinstall).await {
                error!(server = %server.id(), reinstall, error = %e, "failed to run install process for server");
            }
        })
    }
}

fn dispatch_power_action(server: Server, action: PowerAction, wait: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        match server.handle_power_action(action, Some(wait)).await {
            Ok(()) => server
                .events()
                .publish(Event::StatusChanged(server.environment().state())),
            Err(e) => report_failure(&server, action, &e),
        }
    })
}

fn report_failure(server: &Server, action: PowerAction, e: &PowerError) {
    if e.is_lock_timeout() {
        warn!(
            server = %server.id(),
            %action,
            "could not process server power action: another power action is currently being processed for this server, please try again later"
        );
    } else {
        error!(server = %server.id(), %action, error = %e, "encountered error processing a server power action in the background");
    }
    server.events().publish(Event::PowerActionFailed {
        action: action.to_string(),
        error: e.to_string(),
    });
}
