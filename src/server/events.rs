//! Per-server event bus.
//!
//! Lifecycle outcomes are not returned to whoever requested them; they are
//! observed by subscribers here. Destroying the bus drops the sender, so every
//! subscriber sees the channel close and no further events are delivered.

use crate::environment::ProcessState;
use parking_lot::Mutex;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 64;

/// Events published for a single server.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A message from the daemon itself, shown in the server console.
    DaemonMessage(String),
    /// A background power action failed.
    PowerActionFailed { action: String, error: String },
    /// The process state changed.
    StatusChanged(ProcessState),
    /// An installation started or finished.
    InstallStarted,
    InstallCompleted { successful: bool },
}

pub struct EventBus {
    sender: Mutex<Option<broadcast::Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Publishes an event. A no-op once the bus is destroyed or when nobody is listening.
    pub fn publish(&self, event: Event) {
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Returns `None` once the bus has been destroyed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Event>> {
        self.sender.lock().as_ref().map(|s| s.subscribe())
    }

    pub fn destroy(&self) {
        self.sender.lock().take();
    }

    pub fn is_destroyed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
