//! Human approval for gated mutations.
//!
//! A gated call is parked in a pending registry under a fresh confirmation
//! id and announced with `confirmation_required`. The user answers through
//! [`ConfirmationWorkflow::resolve`]; an approval runs the real server
//! handler, a denial or a timeout hands the agent an explanatory message.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::ConfirmationError;
use crate::events::{ConfirmationPrompt, EventEmitter, EventKind};
use crate::pending::{OnTimeout, PendingRegistry};
use crate::tools::{ToolCall, ToolCatalog, ToolContext};
use crate::turn::router::execute_server_tool;

/// Tool result handed to the agent when the user declines.
pub const DENIAL_MESSAGE: &str = "The user denied this action, so it was not performed. Do not \
                                  retry it. Propose an alternative approach or ask the user how \
                                  they would like to proceed.";

/// Tool result handed to the agent when nobody answers in time.
pub const CONFIRMATION_TIMEOUT_MESSAGE: &str = "Timed out waiting for confirmation. The user \
                                                did not approve the action in time, so it was \
                                                not performed. Ask the user whether they still \
                                                want it.";

/// Verbs recognized as the first word of a tool name when describing a call.
const KNOWN_VERBS: &[&str] = &[
    "add", "archive", "create", "delete", "duplicate", "edit", "move", "publish", "remove",
    "rename", "restore", "unpublish", "update",
];

/// A confirmation waiting for the user.
#[derive(Clone)]
pub struct PendingConfirmation {
    pub call: ToolCall,
    pub ctx: ToolContext,
    pub description: String,
    emitter: EventEmitter,
}

/// Result of resolving a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    pub confirmation_id: String,
    pub approved: bool,
    /// Text delivered to the waiting tool call.
    pub result: String,
    /// False if the turn that asked had already gone away.
    pub delivered: bool,
}

pub struct ConfirmationWorkflow {
    pending: PendingRegistry<PendingConfirmation>,
    catalog: Arc<ToolCatalog>,
    timeout: Duration,
}

impl ConfirmationWorkflow {
    pub fn new(catalog: Arc<ToolCatalog>, timeout: Duration) -> Self {
        Self {
            pending: PendingRegistry::new("confirmations"),
            catalog,
            timeout,
        }
    }

    /// Human-readable summary of a call, e.g. `Create folder 'Guides' in space 'Docs'`.
    pub fn describe(&self, call: &ToolCall) -> String {
        self.catalog
            .get(&call.name)
            .and_then(|tool| tool.describe_call(&call.params()))
            .unwrap_or_else(|| describe_call(call))
    }

    /// Ask the user to approve `call` and wait for the answer.
    ///
    /// Always yields text for the agent: the handler's result on approval,
    /// [`DENIAL_MESSAGE`] on denial, [`CONFIRMATION_TIMEOUT_MESSAGE`] if the
    /// deadline passes.
    pub async fn request(&self, call: &ToolCall, ctx: ToolContext, emitter: &EventEmitter) -> String {
        let id = Uuid::new_v4().to_string();
        let description = self.describe(call);

        let handle = match self
            .pending
            .register(
                id.clone(),
                PendingConfirmation {
                    call: call.clone(),
                    ctx,
                    description: description.clone(),
                    emitter: emitter.clone(),
                },
                Some(ctx.user_id),
                self.timeout,
                OnTimeout::Resolve(CONFIRMATION_TIMEOUT_MESSAGE.to_string()),
            )
            .await
        {
            Ok(handle) => handle,
            Err(e) => return format!("Error: could not request confirmation: {}", e),
        };

        tracing::info!(
            conversation_id = %ctx.conversation_id,
            confirmation_id = %id,
            tool = %call.name,
            "Awaiting user confirmation"
        );
        emitter.emit(EventKind::ConfirmationRequired {
            confirmation: ConfirmationPrompt {
                id,
                tool_name: call.name.clone(),
                tool_args: call.arguments.clone(),
                description,
            },
        });

        match handle.wait().await {
            Ok(text) => text,
            Err(e) => format!("Error: confirmation for {} did not complete: {}", call.name, e),
        }
    }

    /// Answer a pending confirmation on behalf of `requesting_user`.
    pub async fn resolve(
        &self,
        confirmation_id: &str,
        approved: bool,
        requesting_user: i64,
    ) -> Result<ConfirmationOutcome, ConfirmationError> {
        let entry = self
            .pending
            .get(confirmation_id)
            .await
            .ok_or_else(|| ConfirmationError::NotFound(confirmation_id.to_string()))?;
        if entry.owner_user_id.is_some_and(|owner| owner != requesting_user) {
            tracing::warn!(
                confirmation_id,
                requesting_user,
                "Confirmation resolution attempted by another user"
            );
            return Err(ConfirmationError::Forbidden {
                confirmation_id: confirmation_id.to_string(),
                requesting_user,
            });
        }

        // Claiming stops the deadline timer; from here this call owns the
        // completion even while the approved handler runs.
        let claimed = self
            .pending
            .claim(confirmation_id)
            .await
            .ok_or_else(|| ConfirmationError::NotFound(confirmation_id.to_string()))?;
        let pending = claimed.entry.meta.clone();

        let result = if approved {
            match self.catalog.get(&pending.call.name) {
                Some(tool) => execute_server_tool(tool.as_ref(), &pending.call, &pending.ctx).await,
                None => format!(
                    "Error: '{}' has no server-side handler and was not run.",
                    pending.call.name
                ),
            }
        } else {
            DENIAL_MESSAGE.to_string()
        };

        let delivered = claimed.complete(Ok(result.clone()));
        tracing::info!(
            conversation_id = %pending.ctx.conversation_id,
            confirmation_id,
            tool = %pending.call.name,
            approved,
            delivered,
            "Confirmation resolved"
        );
        pending.emitter.emit(EventKind::ConfirmationResolved {
            confirmation_id: confirmation_id.to_string(),
            approved,
        });

        Ok(ConfirmationOutcome {
            confirmation_id: confirmation_id.to_string(),
            approved,
            result,
            delivered,
        })
    }

    /// Number of confirmations waiting for an answer.
    pub async fn pending_count(&self) -> usize {
        self.pending.len().await
    }

    /// Cancel every outstanding confirmation.
    pub async fn shutdown(&self) -> usize {
        self.pending.shutdown().await
    }
}

/// Generic description from the tool name and common arguments.
fn describe_call(call: &ToolCall) -> String {
    let (verb, noun) = match call.name.split_once('_') {
        Some((verb, rest)) if KNOWN_VERBS.contains(&verb) => (capitalize(verb), rest.replace('_', " ")),
        _ => ("Run".to_string(), call.name.clone()),
    };

    let mut description = format!("{} {}", verb, noun);
    if let Some(target) = ["name", "title", "path", "id"]
        .iter()
        .find_map(|key| call.arg_str(key))
    {
        description.push_str(&format!(" '{}'", target));
    }
    if let Some(space) = ["space", "spaceName", "space_name"]
        .iter()
        .find_map(|key| call.arg_str(key))
    {
        description.push_str(&format!(" in space '{}'", space));
    }
    description
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
