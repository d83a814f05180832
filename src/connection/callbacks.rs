//! Callback execution context
//!
//! Owner callbacks run on their own task, one at a time and in the order the
//! connection context posted them.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

/// Notifications delivered to the owner of the connection
pub trait Callbacks: Send + Sync + 'static {
    /// Trusted channel is open
    fn on_connected(&self);

    /// Trusted channel went away
    fn on_disconnected(&self);

    /// Message pushed by the desktop, always a JSON object
    fn on_message_received(&self, message: Value);
}

enum CallbackEvent {
    Connected,
    Disconnected,
    Message(Value),
}

/// Serial queue in front of the owner's [`Callbacks`]
pub(crate) struct CallbackContext {
    tx: mpsc::UnboundedSender<CallbackEvent>,
}

impl CallbackContext {
    pub(crate) fn spawn(callbacks: Arc<dyn Callbacks>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    CallbackEvent::Connected => callbacks.on_connected(),
                    CallbackEvent::Disconnected => callbacks.on_disconnected(),
                    CallbackEvent::Message(message) => callbacks.on_message_received(message),
                }
            }
        });
        Self { tx }
    }

    pub(crate) fn connected(&self) {
        let _ = self.tx.send(CallbackEvent::Connected);
    }

    pub(crate) fn disconnected(&self) {
        let _ = self.tx.send(CallbackEvent::Disconnected);
    }

    pub(crate) fn message(&self, message: Value) {
        let _ = self.tx.send(CallbackEvent::Message(message));
    }
}
