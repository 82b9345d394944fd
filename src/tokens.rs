//! Deny list for revoked session tokens.
//!
//! Shared by every server on the node and injected through
//! [`NodeSystem`](crate::lifecycle::NodeSystem) rather than held in a global.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::SystemTime;

#[derive(Default)]
pub struct DenyList {
    denied: RwLock<HashMap<String, SystemTime>>,
}

impl DenyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Denies every token with this id issued before now.
    pub fn deny(&self, jti: impl Into<String>) {
        self.denied.write().insert(jti.into(), SystemTime::now());
    }

    /// Whether a token with `jti` issued at `issued_at` has been revoked.
    pub fn is_denied(&self, jti: &str, issued_at: SystemTime) -> bool {
        self.denied
            .read()
            .get(jti)
            .is_some_and(|denied_at| issued_at <= *denied_at)
    }

    pub fn len(&self) -> usize {
        self.denied.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
