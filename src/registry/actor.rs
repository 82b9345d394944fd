use super::client::ManagerClient;
use super::error::RegistryError;
use super::message::ManagerRequest;
use crate::server::{Server, ServerId};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Owns the node's server map and processes [`ManagerRequest`]s one at a time.
pub struct ManagerActor {
    receiver: mpsc::Receiver<ManagerRequest>,
    servers: HashMap<ServerId, Server>,
}

impl ManagerActor {
    pub fn new(buffer_size: usize) -> (Self, ManagerClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            servers: HashMap::new(),
        };
        (actor, ManagerClient::new(sender))
    }

    /// Runs until every client has been dropped.
    pub async fn run(mut self) {
        info!("Registry started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ManagerRequest::Add { server, respond_to } => {
                    let id = server.id();
                    if self.servers.contains_key(&id) {
                        warn!(server = %id, "Already registered");
                        let _ = respond_to.send(Err(RegistryError::AlreadyRegistered(id)));
                        continue;
                    }
                    self.servers.insert(id, server);
                    info!(server = %id, size = self.servers.len(), "Registered");
                    let _ = respond_to.send(Ok(()));
                }
                ManagerRequest::Get { id, respond_to } => {
                    let server = self.servers.get(&id).cloned();
                    debug!(server = %id, found = server.is_some(), "Get");
                    let _ = respond_to.send(Ok(server));
                }
                ManagerRequest::All { respond_to } => {
                    let _ = respond_to.send(Ok(self.servers.values().cloned().collect()));
                }
                ManagerRequest::Remove { filter, respond_to } => {
                    let before = self.servers.len();
                    self.servers.retain(|_, server| !filter(server));
                    let removed = before - self.servers.len();
                    info!(removed, size = self.servers.len(), "Deregistered");
                    let _ = respond_to.send(Ok(removed));
                }
            }
        }

        info!(size = self.servers.len(), "Registry shutdown");
    }
}
