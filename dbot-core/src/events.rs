//! Observable runtime events, delivered over a broadcast channel.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::error;

use crate::error::BotError;
use crate::types::{Address, Message};

#[derive(Debug, Clone)]
pub enum BotEvent {
    /// Raw inbound event, before receive middleware.
    Receive(Message),
    /// Inbound message that passed receive middleware and is about to be routed.
    Incoming(Message),
    /// Non-message inbound event (conversation update, typing, ...).
    Event(Message),
    /// A session was created for `address` and is about to dispatch.
    Routing(Address),
    /// Outbound message, before send middleware.
    Send(Message),
    /// Outbound message that passed send middleware.
    Outgoing(Message),
    LookupUser(Address),
    GetStorageData { user_id: String, conversation_id: Option<String> },
    SaveStorageData { user_id: String, conversation_id: Option<String> },
    Error(Arc<BotError>),
}

/// Cloneable handle to the event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: BotEvent) {
        // No subscribers is normal for informational events.
        let _ = self.tx.send(event);
    }

    /// Emits an error; logs it when nobody is listening so it is never dropped silently.
    pub fn emit_error(&self, err: BotError) {
        if self.tx.receiver_count() == 0 {
            error!(error = %err, "unhandled bot error");
            return;
        }
        let _ = self.tx.send(BotEvent::Error(Arc::new(err)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_error_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit_error(BotError::Dialog("boom".into()));
        match rx.recv().await.unwrap() {
            BotEvent::Error(e) => assert_eq!(e.to_string(), "Dialog error: boom"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_error_without_subscriber_does_not_panic() {
        let bus = EventBus::default();
        bus.emit_error(BotError::Dialog("nobody listening".into()));
    }
}
