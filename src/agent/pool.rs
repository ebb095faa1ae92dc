//! Per-conversation agent environments.
//!
//! Environments are created on first use and reused for every later turn of
//! the same conversation. Creation is single-flight: concurrent first turns
//! on a new conversation join the same in-progress creation instead of each
//! building their own.
//!
//! Nothing evicts on its own: a slot lives until [`AgentPool::evict`] is
//! called, so a long-running process holds one environment per conversation
//! it has ever served.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

use crate::agent::Agent;
use crate::error::AgentError;

/// Builds the agent environment for a conversation.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(&self, conversation_id: Uuid) -> Result<Arc<dyn Agent>, AgentError>;
}

#[async_trait]
impl<F> AgentFactory for F
where
    F: Fn(Uuid) -> Result<Arc<dyn Agent>, AgentError> + Send + Sync,
{
    async fn create(&self, conversation_id: Uuid) -> Result<Arc<dyn Agent>, AgentError> {
        self(conversation_id)
    }
}

type Slot = Arc<OnceCell<Arc<dyn Agent>>>;

/// Cache of agent environments keyed by conversation ID.
pub struct AgentPool {
    factory: Arc<dyn AgentFactory>,
    agents: Mutex<HashMap<Uuid, Slot>>,
}

impl AgentPool {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            factory,
            agents: Mutex::new(HashMap::new()),
        }
    }

    /// Get the conversation's agent, creating it if needed.
    ///
    /// A failed creation leaves the slot empty so the next turn retries.
    pub async fn get_or_create(&self, conversation_id: Uuid) -> Result<Arc<dyn Agent>, AgentError> {
        let slot = {
            let mut agents = self.agents.lock().await;
            Arc::clone(agents.entry(conversation_id).or_default())
        };

        let agent = slot
            .get_or_try_init(|| async {
                tracing::info!(conversation_id = %conversation_id, "Creating agent environment");
                self.factory.create(conversation_id).await
            })
            .await?;

        Ok(Arc::clone(agent))
    }

    /// Forget a conversation's environment. Returns true if one existed.
    pub async fn evict(&self, conversation_id: Uuid) -> bool {
        self.agents.lock().await.remove(&conversation_id).is_some()
    }

    /// Number of conversations with a slot (created or being created).
    pub async fn len(&self) -> usize {
        self.agents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
