//! Local echo agent.
//!
//! Stands in for a real model when running the gateway locally. Plain text
//! is echoed back word by word. A message of the form
//! `/tool <name> [json-arguments]` makes the agent call that tool through
//! the turn hooks, which is enough to drive the gate, confirmations and
//! remote dispatch by hand.

use async_trait::async_trait;
use uuid::Uuid;

use crate::agent::{Agent, AgentInput, AgentOutput, TurnHooks};
use crate::conversation::{ChatMessage, Role};
use crate::error::AgentError;
use crate::events::{ToolEvent, ToolStatus};
use crate::tools::ToolCall;

const TOOL_PREFIX: &str = "/tool";

/// Agent that echoes the user or runs a single requested tool.
#[derive(Debug, Default)]
pub struct EchoAgent;

/// What the last user message asks for.
#[derive(Debug, PartialEq)]
enum Request {
    Echo(String),
    Tool {
        name: String,
        arguments: serde_json::Value,
    },
}

fn parse_request(content: &str) -> Result<Request, String> {
    let content = content.trim();
    let rest = match content.strip_prefix(TOOL_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
        _ => return Ok(Request::Echo(content.to_string())),
    };

    let rest = rest.trim_start();
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if name.is_empty() {
        return Err("usage: /tool <name> [json-arguments]".to_string());
    }

    let arguments = if args.trim().is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(args.trim()).map_err(|e| format!("invalid tool arguments: {}", e))?
    };

    Ok(Request::Tool {
        name: name.to_string(),
        arguments,
    })
}

#[async_trait]
impl Agent for EchoAgent {
    async fn run(&self, input: AgentInput, hooks: &dyn TurnHooks) -> Result<AgentOutput, AgentError> {
        let last_user = input
            .history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        match parse_request(last_user) {
            Ok(Request::Echo(text)) => {
                let mut reply = String::new();
                for (i, word) in text.split_whitespace().enumerate() {
                    let delta = if i == 0 {
                        word.to_string()
                    } else {
                        format!(" {}", word)
                    };
                    hooks.on_text_delta(&delta);
                    reply.push_str(&delta);
                }
                Ok(AgentOutput {
                    new_messages: vec![ChatMessage::assistant(reply.clone())],
                    assistant_text: reply,
                })
            }
            Ok(Request::Tool { name, arguments }) => {
                let call = ToolCall::new(format!("call_{}", Uuid::new_v4().simple()), name, arguments);
                hooks.on_tool_event(ToolEvent::new(&call.name, ToolStatus::Started));

                let request_msg = ChatMessage::assistant(format!("Calling {}.", call.name))
                    .with_tool_calls(vec![call.clone()]);
                let (result, status) = match hooks.run_tool(call.clone()).await {
                    Ok(output) => (output, ToolStatus::Completed),
                    Err(e) => (format!("Error: {}", e), ToolStatus::Failed),
                };
                hooks.on_tool_event(ToolEvent::new(&call.name, status).with_result(&result));

                let reply = format!("{} returned: {}", call.name, result);
                hooks.on_text_delta(&reply);
                Ok(AgentOutput {
                    new_messages: vec![
                        request_msg,
                        ChatMessage::tool_result(&call.id, &result),
                        ChatMessage::assistant(reply.clone()),
                    ],
                    assistant_text: reply,
                })
            }
            Err(usage) => {
                hooks.on_text_delta(&usage);
                Ok(AgentOutput {
                    new_messages: vec![ChatMessage::assistant(usage.clone())],
                    assistant_text: usage,
                })
            }
        }
    }
}
