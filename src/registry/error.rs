use crate::server::ServerId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("registry actor closed")]
    ActorClosed,

    #[error("registry actor dropped the response channel")]
    ActorDropped,

    #[error("server {0} is already registered")]
    AlreadyRegistered(ServerId),
}
