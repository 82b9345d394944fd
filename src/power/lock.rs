//! The per-server power lock.
//!
//! A single-permit semaphore, created on first use and kept for the life of
//! the server. Holding the returned permit is holding the lock; dropping it
//! releases the lock on every exit path, unwinding included.

use super::error::DeadlineExceeded;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(Default)]
pub struct PowerLock {
    semaphore: OnceLock<Semaphore>,
}

impl PowerLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn semaphore(&self) -> &Semaphore {
        self.semaphore.get_or_init(|| Semaphore::new(1))
    }

    /// Takes the lock if it is free right now.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.semaphore().try_acquire().ok()
    }

    /// Waits up to `timeout` for the lock.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<SemaphorePermit<'_>, DeadlineExceeded> {
        match tokio::time::timeout(timeout, self.semaphore().acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            // The semaphore is never closed; treat it like an elapsed deadline anyway.
            Ok(Err(_)) | Err(_) => Err(DeadlineExceeded),
        }
    }

    /// Whether someone currently holds the lock.
    ///
    /// Probes with a non-blocking acquire that is released immediately, so the
    /// answer can be stale by the time it is read. A lock that was never
    /// created is not held.
    pub fn is_held(&self) -> bool {
        match self.semaphore.get() {
            None => false,
            Some(semaphore) => semaphore.try_acquire().is_err(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.semaphore.get().is_some()
    }
}
