//! Per-turn event emitter.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::BroadcastError;
use crate::events::Broadcaster;
use crate::events::types::{EventKind, StreamEvent};

#[derive(Clone)]
struct Origin {
    connection_id: Uuid,
    tx: mpsc::UnboundedSender<StreamEvent>,
}

/// Sends events to the originating connection and fans them out to the
/// conversation's other subscribers.
#[derive(Clone)]
pub struct EventEmitter {
    conversation_id: Uuid,
    origin: Option<Origin>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl EventEmitter {
    /// An emitter with no originating connection; everything goes through
    /// the broadcaster.
    pub fn new(conversation_id: Uuid, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            conversation_id,
            origin: None,
            broadcaster,
        }
    }

    /// Attach the originating connection. Returns the receiving end of its
    /// in-stream channel.
    pub fn with_origin(
        mut self,
        connection_id: Uuid,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.origin = Some(Origin { connection_id, tx });
        (self, rx)
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Emit an event. Never fails: a vanished origin or a fan-out error is
    /// logged and the turn carries on.
    pub fn emit(&self, kind: EventKind) {
        let event = StreamEvent::new(kind);
        let event_type = event.event_type();

        let origin_id = self.origin.as_ref().map(|origin| {
            if origin.tx.send(event.clone()).is_err() {
                tracing::debug!(
                    conversation_id = %self.conversation_id,
                    event_type,
                    "Originating connection closed, event not delivered in-stream"
                );
            }
            origin.connection_id
        });

        match self.broadcaster.publish(self.conversation_id, origin_id, event) {
            Ok(_) | Err(BroadcastError::NoSubscribers) => {}
            Err(e) => {
                tracing::warn!(
                    conversation_id = %self.conversation_id,
                    event_type,
                    "Failed to fan out event: {}",
                    e
                );
            }
        }
    }
}
