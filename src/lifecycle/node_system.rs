use crate::api::Handlers;
use crate::config::Config;
use crate::install::Installer;
use crate::registry::{ManagerActor, ManagerClient};
use crate::teardown::TeardownCoordinator;
use crate::tokens::DenyList;
use crate::transfers::DownloadRegistry;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

const REGISTRY_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("actor task failed: {0}")]
    Task(#[from] JoinError),
}

/// Everything shared by the servers on this node.
///
/// `NodeSystem` starts the registry actor and wires the process-wide services
/// (download registry, token deny list, teardown coordinator) into the
/// request handlers. Nothing here is a global; tests build as many
/// independent systems as they like.
///
/// ```ignore
/// let system = NodeSystem::new(Arc::new(config), installer);
/// system.manager.add(server).await?;
/// system.handlers.post_power(&server, PowerRequest::new("start")).await?;
/// system.shutdown().await?;
/// ```
pub struct NodeSystem {
    pub manager: ManagerClient,
    pub downloads: Arc<DownloadRegistry>,
    pub deny_list: Arc<DenyList>,
    pub teardown: TeardownCoordinator,
    pub handlers: Handlers,
    pub config: Arc<Config>,
    handles: Vec<JoinHandle<()>>,
}

impl NodeSystem {
    pub fn new(config: Arc<Config>, installer: Arc<dyn Installer>) -> Self {
        let (actor, manager) = ManagerActor::new(REGISTRY_BUFFER);
        let handle = tokio::spawn(actor.run());

        let downloads = Arc::new(DownloadRegistry::new());
        let deny_list = Arc::new(DenyList::new());
        let teardown = TeardownCoordinator::new(manager.clone(), downloads.clone());
        let handlers = Handlers::new(
            manager.clone(),
            teardown.clone(),
            deny_list.clone(),
            installer,
            config.clone(),
        );

        Self {
            manager,
            downloads,
            deny_list,
            teardown,
            handlers,
            config,
            handles: vec![handle],
        }
    }

    /// Closes the registry and waits for its actor to finish.
    ///
    /// The actor exits once every [`ManagerClient`] is gone, so clones handed
    /// out elsewhere must be dropped first.
    pub async fn shutdown(self) -> Result<(), ShutdownError> {
        info!("Shutting down node...");

        drop(self.handlers);
        drop(self.teardown);
        drop(self.manager);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Actor task failed");
                return Err(e.into());
            }
        }

        info!("Node shutdown complete.");
        Ok(())
    }
}
