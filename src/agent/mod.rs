//! Agent boundary.
//!
//! The model itself is opaque: the turn processor hands an [`Agent`] the
//! conversation history and a set of [`TurnHooks`], and gets back the text
//! and messages the turn produced. Everything the agent does to the outside
//! world goes through `TurnHooks::run_tool`.

mod echo;
mod pool;

pub use echo::EchoAgent;
pub use pool::{AgentFactory, AgentPool};

use async_trait::async_trait;
use uuid::Uuid;

use crate::conversation::ChatMessage;
use crate::error::AgentError;
use crate::events::ToolEvent;
use crate::tools::{ToolCall, ToolError, ToolSchema};

/// Input for one agent turn.
#[derive(Debug, Clone)]
pub struct AgentInput {
    pub conversation_id: Uuid,
    pub history: Vec<ChatMessage>,
    /// Every tool the agent may call this turn, `update_plan` first.
    pub tools: Vec<ToolSchema>,
}

/// What one agent turn produced.
#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    /// Full assistant response text of the turn.
    pub assistant_text: String,
    /// Messages to append to the transcript, in order.
    pub new_messages: Vec<ChatMessage>,
}

/// Callbacks available to the agent during a turn.
#[async_trait]
pub trait TurnHooks: Send + Sync {
    /// Run a tool call.
    ///
    /// Local failures, gate blocks and denials come back as `Ok` text the
    /// agent should treat as the tool's output. `Err` means this specific
    /// call failed (e.g. the remote client never answered) and should be
    /// recorded as a failed tool result.
    async fn run_tool(&self, call: ToolCall) -> Result<String, ToolError>;

    /// Incremental assistant text.
    fn on_text_delta(&self, delta: &str);

    /// Tool lifecycle notice.
    fn on_tool_event(&self, event: ToolEvent);
}

/// A conversational agent able to run one streamed turn.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn run(&self, input: AgentInput, hooks: &dyn TurnHooks) -> Result<AgentOutput, AgentError>;
}
