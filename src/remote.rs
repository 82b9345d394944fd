//! Control-plane synchronisation.
//!
//! The control plane holds the canonical definition of every server. Before a
//! boot the daemon pulls the latest definition through a [`RemoteClient`];
//! the transport and payload encoding are up to the implementation.

use crate::server::{ServerConfig, ServerId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("server {0} is not known to the control plane")]
    NotFound(ServerId),

    #[error("control plane request failed: {0}")]
    Request(String),
}

/// Source of authoritative server definitions.
#[async_trait]
pub trait RemoteClient: Send + Sync + 'static {
    async fn get_server_configuration(&self, id: ServerId) -> Result<ServerConfig, RemoteError>;
}

/// A control plane whose definitions are held in memory, loaded from the
/// daemon configuration and updatable at runtime.
#[derive(Default)]
pub struct StaticRemote {
    servers: RwLock<HashMap<ServerId, ServerConfig>>,
}

impl StaticRemote {
    pub fn new(servers: impl IntoIterator<Item = ServerConfig>) -> Self {
        Self {
            servers: RwLock::new(servers.into_iter().map(|s| (s.uuid, s)).collect()),
        }
    }

    /// Inserts or replaces a definition.
    pub fn put(&self, config: ServerConfig) {
        self.servers.write().insert(config.uuid, config);
    }
}

#[async_trait]
impl RemoteClient for StaticRemote {
    async fn get_server_configuration(&self, id: ServerId) -> Result<ServerConfig, RemoteError> {
        self.servers
            .read()
            .get(&id)
            .cloned()
            .ok_or(RemoteError::NotFound(id))
    }
}
