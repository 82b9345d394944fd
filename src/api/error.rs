use crate::registry::RegistryError;
use crate::server::ServerId;
use crate::teardown::TeardownError;
use thiserror::Error;

/// Request rejections. Each maps to the HTTP status a transport would use.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("server {0} not found")]
    NotFound(ServerId),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    UnprocessableEntity(String),

    #[error("{0}")]
    BadGateway(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::UnprocessableEntity(_) => 422,
            ApiError::BadGateway(_) => 502,
            ApiError::Registry(RegistryError::AlreadyRegistered(_)) => 409,
            ApiError::Registry(_) | ApiError::Teardown(_) => 500,
        }
    }
}
