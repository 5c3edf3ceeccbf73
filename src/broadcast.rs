//! Notification fan-out to connected protocol clients
//!
//! Every state change announced by the registries is pushed through a tokio
//! broadcast channel. TCP sessions, WebSocket clients and the REPL each hold
//! their own receiver.

use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of the notification channel
pub const DEFAULT_CAPACITY: usize = 256;

/// Cheap-to-clone handle on the notification channel
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<String>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send a notification to every subscriber
    ///
    /// Best-effort: having no subscribers is not an error.
    pub fn send(&self, message: impl Into<String>) {
        let message = message.into();
        trace!("Broadcast: {}", message);
        let _ = self.tx.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
