//! Server deletion.
//!
//! Deleting a server touches several subsystems that each own part of it.
//! The [`TeardownCoordinator`] cancels them in a fixed order so that no
//! background work outlives the server and nobody can reach it halfway
//! through. Destroying the environment is the only step that can abort the
//! cascade; once it succeeds the server is deregistered straight away and its
//! files are removed in the background.

use crate::environment::EnvironmentError;
use crate::registry::{ManagerClient, RegistryError};
use crate::server::Server;
use crate::transfers::DownloadRegistry;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("failed to destroy server environment")]
    Destroy(#[source] EnvironmentError),

    #[error("failed to deregister server")]
    Registry(#[from] RegistryError),
}

#[derive(Clone)]
pub struct TeardownCoordinator {
    manager: ManagerClient,
    downloads: Arc<DownloadRegistry>,
}

impl TeardownCoordinator {
    pub fn new(manager: ManagerClient, downloads: Arc<DownloadRegistry>) -> Self {
        Self { manager, downloads }
    }

    /// Tears `server` down and deregisters it.
    ///
    /// Returns the handle of the background file removal. The server is
    /// already unreachable through the registry when this returns, whether or
    /// not the removal has finished.
    #[instrument(skip_all, fields(server = %server.id()))]
    pub async fn delete(&self, server: &Server) -> Result<JoinHandle<()>, TeardownError> {
        let id = server.id();

        // Blocks new boots from here on.
        server.set_suspended(true);
        server.cancel_context();
        server.events().destroy();
        server.sessions().cancel_all();

        for download in self.downloads.by_server(id) {
            download.cancel();
        }

        if let Err(e) = server.environment().destroy().await {
            warn!(error = %e, "failed to destroy server environment");
            return Err(TeardownError::Destroy(e));
        }

        let root = server.filesystem().path();
        let cleanup = tokio::spawn(async move {
            match tokio::fs::remove_dir_all(&root).await {
                Ok(()) => info!(server = %id, path = %root.display(), "removed server files"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(server = %id, path = %root.display(), error = %e, "failed to remove server files"),
            }
        });

        self.manager.remove(Box::new(move |s: &Server| s.id() == id)).await?;
        info!("server deleted");
        Ok(cleanup)
    }
}
