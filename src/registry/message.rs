use super::error::RegistryError;
use crate::server::{Server, ServerId};
use tokio::sync::oneshot;

pub type Response<T> = oneshot::Sender<Result<T, RegistryError>>;

/// Predicate used to select servers for removal.
pub type ServerFilter = Box<dyn Fn(&Server) -> bool + Send>;

/// Requests handled by the [`ManagerActor`](super::ManagerActor).
pub enum ManagerRequest {
    Add {
        server: Server,
        respond_to: Response<()>,
    },
    Get {
        id: ServerId,
        respond_to: Response<Option<Server>>,
    },
    All {
        respond_to: Response<Vec<Server>>,
    },
    /// Removes every server matching the filter and returns how many went.
    Remove {
        filter: ServerFilter,
        respond_to: Response<usize>,
    },
}

impl std::fmt::Debug for ManagerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerRequest::Add { server, .. } => f.debug_struct("Add").field("server", &server.id()).finish(),
            ManagerRequest::Get { id, .. } => f.debug_struct("Get").field("id", id).finish(),
            ManagerRequest::All { .. } => f.write_str("All"),
            ManagerRequest::Remove { .. } => f.write_str("Remove"),
        }
    }
}
