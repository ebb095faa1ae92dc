//! Conversation store.
//!
//! The store owns conversation state and transcripts; the turn engine only
//! reads and writes through [`ConversationStore`]. [`InMemoryStore`] backs
//! the bundled server and the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::conversation::{ChatMessage, ConversationState};
use crate::error::StoreError;
use crate::gate::{Mode, Phase};

/// Persistence boundary for conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create the conversation if it does not exist yet and return its state.
    async fn ensure_conversation(&self, id: Uuid) -> Result<ConversationState, StoreError>;

    async fn state(&self, id: Uuid) -> Result<ConversationState, StoreError>;

    async fn set_plan(&self, id: Uuid, plan: &str, phase: Phase) -> Result<(), StoreError>;

    async fn set_mode(&self, id: Uuid, mode: Mode) -> Result<ConversationState, StoreError>;

    /// Full transcript in insertion order.
    async fn messages(&self, id: Uuid) -> Result<Vec<ChatMessage>, StoreError>;

    async fn append_messages(&self, id: Uuid, messages: &[ChatMessage]) -> Result<(), StoreError>;

    /// Drop every message after `message_id` and return what remains.
    async fn truncate_after(
        &self,
        id: Uuid,
        message_id: Uuid,
    ) -> Result<Vec<ChatMessage>, StoreError>;
}

#[derive(Debug, Default)]
struct ConversationRecord {
    state: ConversationState,
    messages: Vec<ChatMessage>,
}

/// Volatile store keeping everything in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    conversations: RwLock<HashMap<Uuid, ConversationRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn ensure_conversation(&self, id: Uuid) -> Result<ConversationState, StoreError> {
        let mut conversations = self.conversations.write().await;
        let record = conversations.entry(id).or_insert_with(|| {
            tracing::debug!(conversation_id = %id, "Created conversation");
            ConversationRecord::default()
        });
        Ok(record.state.clone())
    }

    async fn state(&self, id: Uuid) -> Result<ConversationState, StoreError> {
        self.conversations
            .read()
            .await
            .get(&id)
            .map(|r| r.state.clone())
            .ok_or(StoreError::ConversationNotFound(id))
    }

    async fn set_plan(&self, id: Uuid, plan: &str, phase: Phase) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let record = conversations
            .get_mut(&id)
            .ok_or(StoreError::ConversationNotFound(id))?;
        record.state.plan = Some(plan.to_string());
        record.state.plan_phase = phase;
        Ok(())
    }

    async fn set_mode(&self, id: Uuid, mode: Mode) -> Result<ConversationState, StoreError> {
        let mut conversations = self.conversations.write().await;
        let record = conversations
            .get_mut(&id)
            .ok_or(StoreError::ConversationNotFound(id))?;
        record.state.mode = mode;
        Ok(record.state.clone())
    }

    async fn messages(&self, id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        self.conversations
            .read()
            .await
            .get(&id)
            .map(|r| r.messages.clone())
            .ok_or(StoreError::ConversationNotFound(id))
    }

    async fn append_messages(&self, id: Uuid, messages: &[ChatMessage]) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let record = conversations
            .get_mut(&id)
            .ok_or(StoreError::ConversationNotFound(id))?;
        record.messages.extend_from_slice(messages);
        Ok(())
    }

    async fn truncate_after(
        &self,
        id: Uuid,
        message_id: Uuid,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let mut conversations = self.conversations.write().await;
        let record = conversations
            .get_mut(&id)
            .ok_or(StoreError::ConversationNotFound(id))?;
        let position = record
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or(StoreError::MessageNotFound {
                conversation_id: id,
                message_id,
            })?;
        record.messages.truncate(position + 1);
        Ok(record.messages.clone())
    }
}
