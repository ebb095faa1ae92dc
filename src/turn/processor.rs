//! Turn processor.
//!
//! Drives one agent turn from user message to `message_complete`:
//!
//! ```text
//! Assembling ──► Streaming ──► Persisting ──► Completed
//!      │             │              │
//!      └─────────────┴──────────────┴───────► Failed (error event)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::agent::{AgentInput, AgentPool, TurnHooks};
use crate::conversation::{ChatMessage, Role};
use crate::error::Result;
use crate::events::{EventEmitter, EventKind, ToolEvent};
use crate::tools::{RemoteToolSpec, ToolCall, ToolCatalog, ToolContext, ToolError};
use crate::turn::navigation;
use crate::turn::plan;
use crate::turn::router::{RouterDeps, ToolRouter};

/// Where a turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Assembling,
    Streaming,
    Persisting,
    Completed,
    Failed,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Assembling => "assembling",
            TurnState::Streaming => "streaming",
            TurnState::Persisting => "persisting",
            TurnState::Completed => "completed",
            TurnState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One user submission.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: Uuid,
    pub user_id: i64,
    pub content: String,
    /// Replay the turn following this message, discarding everything after it.
    pub retry_from: Option<Uuid>,
    /// Tools the connected client can run itself.
    pub remote_tools: Vec<RemoteToolSpec>,
}

/// What a finished turn left behind.
#[derive(Debug, Clone, Default)]
pub struct TurnSummary {
    pub assistant_message: Option<ChatMessage>,
    pub persisted: usize,
    pub navigation_actions: usize,
}

/// Shared services a turn runs against.
#[derive(Clone)]
pub struct TurnDeps {
    pub agents: Arc<AgentPool>,
    pub catalog: Arc<ToolCatalog>,
    pub router: RouterDeps,
}

pub struct TurnProcessor {
    deps: TurnDeps,
}

impl TurnProcessor {
    pub fn new(deps: TurnDeps) -> Self {
        Self { deps }
    }

    pub fn deps(&self) -> &TurnDeps {
        &self.deps
    }

    /// Run a turn to completion.
    ///
    /// A turn-fatal failure emits exactly one `error` event before it is
    /// returned.
    pub async fn process(&self, request: TurnRequest, emitter: EventEmitter) -> Result<TurnSummary> {
        let conversation_id = request.conversation_id;
        let mut state = TurnState::Assembling;
        match self.run(request, &emitter, &mut state).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    state = %state,
                    "Turn failed: {}",
                    e
                );
                transition(conversation_id, &mut state, TurnState::Failed);
                emitter.emit(EventKind::Error {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: TurnRequest,
        emitter: &EventEmitter,
        state: &mut TurnState,
    ) -> Result<TurnSummary> {
        let conversation_id = request.conversation_id;
        let store = &self.deps.router.store;

        let conversation = store.ensure_conversation(conversation_id).await?;
        let table = self.deps.catalog.dispatch_table(&request.remote_tools)?;

        let mut history = match request.retry_from {
            Some(message_id) => {
                tracing::info!(
                    conversation_id = %conversation_id,
                    message_id = %message_id,
                    "Retrying turn"
                );
                store.truncate_after(conversation_id, message_id).await?
            }
            None => {
                let user_message = ChatMessage::user(request.content);
                store
                    .append_messages(conversation_id, std::slice::from_ref(&user_message))
                    .await?;
                emitter.emit(EventKind::MessageReceived {
                    message_id: user_message.id,
                });
                store.messages(conversation_id).await?
            }
        };
        history.push(ChatMessage::system(plan::reminder(&conversation)));

        let mut tools = vec![plan::update_plan_schema()];
        tools.extend(table.schemas());

        transition(conversation_id, state, TurnState::Streaming);
        let agent = self.deps.agents.get_or_create(conversation_id).await?;
        let router = ToolRouter::new(
            ToolContext {
                conversation_id,
                user_id: request.user_id,
            },
            conversation.mode,
            conversation.plan_phase,
            table,
            emitter.clone(),
            self.deps.router.clone(),
        );
        let hooks = StreamingHooks::new(router, emitter.clone());
        let output = agent
            .run(
                AgentInput {
                    conversation_id,
                    history,
                    tools,
                },
                &hooks,
            )
            .await?;

        transition(conversation_id, state, TurnState::Persisting);
        let streamed = hooks.into_text();
        let mut to_persist: Vec<ChatMessage> = output
            .new_messages
            .iter()
            .filter(|m| !m.is_blank())
            .cloned()
            .collect();
        let dropped = output.new_messages.len() - to_persist.len();
        if dropped > 0 {
            tracing::debug!(conversation_id = %conversation_id, dropped, "Dropped blank messages");
        }

        if !to_persist.iter().any(is_assistant_reply) {
            let full_text = if output.assistant_text.trim().is_empty() {
                streamed
            } else {
                output.assistant_text.clone()
            };
            if !full_text.trim().is_empty() {
                to_persist.push(ChatMessage::assistant(full_text));
            }
        }
        store.append_messages(conversation_id, &to_persist).await?;

        transition(conversation_id, state, TurnState::Completed);
        let assistant_message = to_persist
            .iter()
            .rev()
            .find(|m| is_assistant_reply(m))
            .cloned();
        emitter.emit(EventKind::MessageComplete {
            message: assistant_message.clone(),
        });

        let actions = navigation::scan_messages(&output.new_messages);
        let navigation_actions = actions.len();
        for action in actions {
            emitter.emit(EventKind::NavigationAction { action });
        }

        Ok(TurnSummary {
            assistant_message,
            persisted: to_persist.len(),
            navigation_actions,
        })
    }
}

/// An assistant message with text the user can read.
fn is_assistant_reply(message: &ChatMessage) -> bool {
    message.role == Role::Assistant && !message.content.trim().is_empty()
}

fn transition(conversation_id: Uuid, state: &mut TurnState, next: TurnState) {
    tracing::debug!(conversation_id = %conversation_id, from = %state, to = %next, "Turn state");
    *state = next;
}

/// Hooks handed to the agent for one turn.
struct StreamingHooks {
    router: ToolRouter,
    emitter: EventEmitter,
    seq: AtomicU64,
    text: Mutex<String>,
}

impl StreamingHooks {
    fn new(router: ToolRouter, emitter: EventEmitter) -> Self {
        Self {
            router,
            emitter,
            seq: AtomicU64::new(0),
            text: Mutex::new(String::new()),
        }
    }

    /// Everything streamed so far.
    fn into_text(self) -> String {
        self.text.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TurnHooks for StreamingHooks {
    async fn run_tool(&self, call: ToolCall) -> std::result::Result<String, ToolError> {
        self.router.run_tool(call).await
    }

    fn on_text_delta(&self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(delta);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.emitter.emit(EventKind::ContentChunk {
            content: delta.to_string(),
            seq,
        });
    }

    fn on_tool_event(&self, event: ToolEvent) {
        self.emitter.emit(EventKind::ToolEvent { event });
    }
}

