//! Navigation side channel.
//!
//! A tool may ask the client UI to open a page by returning a JSON object
//! flagged with [`NAVIGATION_MARKER`]. The turn processor scans every tool
//! result of a turn and emits one `navigation_action` per flagged result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::{ChatMessage, Role};

/// Key that marks a tool result as a navigation request.
pub const NAVIGATION_MARKER: &str = "__navigationAction";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationAction {
    pub path: String,
    pub label: String,
}

/// Parse a navigation request out of tool result content.
///
/// Anything that is not a JSON object with `"__navigationAction": true` and
/// a string `path` yields `None`. A missing label falls back to the path.
pub fn parse_navigation_action(content: &str) -> Option<NavigationAction> {
    let value: Value = serde_json::from_str(content.trim()).ok()?;
    let obj = value.as_object()?;
    if obj.get(NAVIGATION_MARKER).and_then(Value::as_bool) != Some(true) {
        return None;
    }

    let path = obj.get("path")?.as_str()?.to_string();
    let label = obj
        .get("label")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| path.clone());
    Some(NavigationAction { path, label })
}

/// Every navigation request found in tool-result messages, in order.
pub fn scan_messages(messages: &[ChatMessage]) -> Vec<NavigationAction> {
    messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| parse_navigation_action(&m.content))
        .collect()
}
