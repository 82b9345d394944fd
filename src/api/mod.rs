//! # Request Handlers
//!
//! Transport-agnostic validation and dispatch of control requests. A handler
//! either rejects a request with an [`ApiError`] or accepts it; long-running
//! work (power actions, installs) continues on a spawned task whose handle is
//! returned, and its outcome is reported on the server's event bus.

pub mod error;
pub mod handlers;

pub use error::ApiError;
pub use handlers::Handlers;

use serde::{Deserialize, Serialize};

/// A lifecycle request as received from the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerRequest {
    /// One of `start`, `stop`, `restart` or `kill`.
    pub action: String,
    /// How long to wait for the power lock. Zero makes a single attempt;
    /// absent uses the configured default.
    #[serde(default)]
    pub wait_seconds: Option<u64>,
}

impl PowerRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            wait_seconds: None,
        }
    }

    pub fn with_wait(mut self, seconds: u64) -> Self {
        self.wait_seconds = Some(seconds);
        self
    }
}
