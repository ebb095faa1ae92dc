//! Event types pushed to conversation subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::conversation::ChatMessage;
use crate::gate::{Mode, Phase};
use crate::tools::ToolCall;
use crate::turn::navigation::NavigationAction;

/// Lifecycle status carried by a `tool_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Started,
    Completed,
    Failed,
}

/// Tool lifecycle notice reported by the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub tool: String,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolEvent {
    pub fn new(tool: impl Into<String>, status: ToolStatus) -> Self {
        Self {
            kind: "tool_call".to_string(),
            tool: tool.into(),
            status,
            result: None,
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }
}

/// Payload of a `confirmation_required` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationPrompt {
    pub id: String,
    pub tool_name: String,
    pub tool_args: serde_json::Map<String, serde_json::Value>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventKind {
    Connected {
        convo_id: Uuid,
    },
    MessageReceived {
        message_id: Uuid,
    },
    Typing {
        user_id: i64,
    },
    ContentChunk {
        content: String,
        seq: u64,
    },
    ToolEvent {
        event: ToolEvent,
    },
    /// Asks the connected client to run one of its declared tools and post
    /// the result back.
    ToolCallRequest {
        tool_call: ToolCall,
    },
    PlanUpdate {
        plan: String,
        phase: Phase,
    },
    ConfirmationRequired {
        confirmation: ConfirmationPrompt,
    },
    ConfirmationResolved {
        confirmation_id: String,
        approved: bool,
    },
    NavigationAction {
        action: NavigationAction,
    },
    MessageComplete {
        message: Option<ChatMessage>,
    },
    ModeChange {
        mode: Mode,
    },
    Error {
        error: String,
    },
}

impl EventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::Connected { .. } => "connected",
            EventKind::MessageReceived { .. } => "message_received",
            EventKind::Typing { .. } => "typing",
            EventKind::ContentChunk { .. } => "content_chunk",
            EventKind::ToolEvent { .. } => "tool_event",
            EventKind::ToolCallRequest { .. } => "tool_call_request",
            EventKind::PlanUpdate { .. } => "plan_update",
            EventKind::ConfirmationRequired { .. } => "confirmation_required",
            EventKind::ConfirmationResolved { .. } => "confirmation_resolved",
            EventKind::NavigationAction { .. } => "navigation_action",
            EventKind::MessageComplete { .. } => "message_complete",
            EventKind::ModeChange { .. } => "mode_change",
            EventKind::Error { .. } => "error",
        }
    }
}

/// A timestamped event as it goes over the wire.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl StreamEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
