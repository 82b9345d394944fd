//! Pending remote file downloads.
//!
//! The download transport lives outside this crate; what matters here is that
//! every in-flight download is registered against its server so that deleting
//! the server can cancel them all.

use crate::server::ServerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A registered download. Dropping the handle does not cancel it.
#[derive(Clone)]
pub struct Download {
    pub id: Uuid,
    pub server: ServerId,
    pub url: String,
    token: CancellationToken,
    registry: Arc<Mutex<HashMap<Uuid, Entry>>>,
}

struct Entry {
    server: ServerId,
    url: String,
    token: CancellationToken,
}

impl Download {
    /// Cancelled when the download should stop.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels the download and removes it from the registry.
    pub fn cancel(&self) {
        self.token.cancel();
        self.registry.lock().remove(&self.id);
    }

    /// Removes a download that finished on its own.
    pub fn finish(&self) {
        self.registry.lock().remove(&self.id);
    }
}

#[derive(Default)]
pub struct DownloadRegistry {
    downloads: Arc<Mutex<HashMap<Uuid, Entry>>>,
}

impl DownloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, server: ServerId, url: impl Into<String>) -> Download {
        let download = Download {
            id: Uuid::new_v4(),
            server,
            url: url.into(),
            token: CancellationToken::new(),
            registry: self.downloads.clone(),
        };
        self.downloads.lock().insert(
            download.id,
            Entry {
                server,
                url: download.url.clone(),
                token: download.token.clone(),
            },
        );
        download
    }

    pub fn by_server(&self, server: ServerId) -> Vec<Download> {
        self.downloads
            .lock()
            .iter()
            .filter(|(_, e)| e.server == server)
            .map(|(id, e)| Download {
                id: *id,
                server: e.server,
                url: e.url.clone(),
                token: e.token.clone(),
                registry: self.downloads.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.downloads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_by_server() {
        let registry = DownloadRegistry::new();
        let a = ServerId::new_v4();
        let b = ServerId::new_v4();
        let first = registry.register(a, "https://example.com/a.jar");
        registry.register(a, "https://example.com/b.jar");
        let other = registry.register(b, "https://example.com/c.jar");

        let pending = registry.by_server(a);
        assert_eq!(pending.len(), 2);
        for download in pending {
            download.cancel();
        }

        assert!(first.token().is_cancelled());
        assert!(!other.token().is_cancelled());
        assert_eq!(registry.len(), 1);

        other.finish();
        assert!(registry.is_empty());
    }
}
