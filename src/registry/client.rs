use super::error::RegistryError;
use super::message::{ManagerRequest, ServerFilter};
use crate::server::{Server, ServerId};
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

/// Cloneable handle to the [`ManagerActor`](super::ManagerActor).
#[derive(Clone)]
pub struct ManagerClient {
    sender: mpsc::Sender<ManagerRequest>,
}

impl ManagerClient {
    pub fn new(sender: mpsc::Sender<ManagerRequest>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, RegistryError>>) -> ManagerRequest,
    ) -> Result<T, RegistryError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| RegistryError::ActorClosed)?;
        response.await.map_err(|_| RegistryError::ActorDropped)?
    }

    #[instrument(skip_all, fields(server = %server.id()))]
    pub async fn add(&self, server: Server) -> Result<(), RegistryError> {
        self.request(|respond_to| ManagerRequest::Add { server, respond_to }).await
    }

    pub async fn get(&self, id: ServerId) -> Result<Option<Server>, RegistryError> {
        self.request(|respond_to| ManagerRequest::Get { id, respond_to }).await
    }

    pub async fn all(&self) -> Result<Vec<Server>, RegistryError> {
        self.request(|respond_to| ManagerRequest::All { respond_to }).await
    }

    /// Removes every server for which `filter` returns true.
    #[instrument(skip_all)]
    pub async fn remove(&self, filter: ServerFilter) -> Result<usize, RegistryError> {
        self.request(|respond_to| ManagerRequest::Remove { filter, respond_to }).await
    }
}
