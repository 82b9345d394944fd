//! Live interactive sessions attached to a server.
//!
//! The session transport lives elsewhere; this only tracks one cancellation
//! token per open session so that they can all be closed at once.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle for one open session. The transport selects on [`Session::token`].
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub token: CancellationToken,
}

#[derive(Default)]
pub struct SessionBag {
    sessions: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl SessionBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session and returns its handle.
    pub fn push(&self) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
        };
        self.sessions.lock().insert(session.id, session.token.clone());
        session
    }

    /// Forgets a session that closed on its own.
    pub fn remove(&self, id: Uuid) {
        self.sessions.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels and forgets every open session.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.sessions.lock().drain().collect();
        for (_, token) in drained {
            token.cancel();
        }
    }
}
