//! Turn event streaming.
//!
//! Every event goes two ways: straight into the stream of the connection
//! that started the turn, and through a [`Broadcaster`] to everyone else
//! watching the same conversation. The second path is best effort.

mod emitter;
mod hub;
pub mod types;

pub use emitter::EventEmitter;
pub use hub::EventHub;
pub use types::{ConfirmationPrompt, EventKind, StreamEvent, ToolEvent, ToolStatus};

use uuid::Uuid;

use crate::error::BroadcastError;

/// Pub/sub fan-out of conversation events.
///
/// Implementations must not block: publishing happens inline on the turn's
/// task. `origin` identifies the connection that already received the event
/// directly so it can be skipped.
pub trait Broadcaster: Send + Sync {
    /// Publish an event. Returns the number of subscribers reached.
    fn publish(
        &self,
        conversation_id: Uuid,
        origin: Option<Uuid>,
        event: StreamEvent,
    ) -> Result<usize, BroadcastError>;
}
