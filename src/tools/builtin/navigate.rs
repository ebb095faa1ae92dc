//! Navigation tool.
//!
//! Returns a navigation marker instead of doing anything itself. The turn
//! processor spots the marker in the tool result and pushes a
//! `navigation_action` event so the client can open the page.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput};
use crate::turn::navigation::NAVIGATION_MARKER;

/// Ask the client UI to open a page.
#[derive(Debug)]
pub struct OpenPageTool;

#[async_trait]
impl Tool for OpenPageTool {
    fn name(&self) -> &str {
        "open_page"
    }

    fn description(&self) -> &str {
        "Open a page in the user's editor, e.g. a draft the user should review."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Application path to open, starting with '/'"
                },
                "label": {
                    "type": "string",
                    "description": "Short label shown to the user"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();

        let path = params
            .get("path")
            .and_then(|v| v.as_str())
            .filter(|p| p.starts_with('/'))
            .ok_or_else(|| {
                ToolError::InvalidParameters("'path' must be a string starting with '/'".into())
            })?;
        let label = params
            .get("label")
            .and_then(|v| v.as_str())
            .unwrap_or(path);

        let mut result = serde_json::Map::new();
        result.insert(NAVIGATION_MARKER.to_string(), serde_json::Value::Bool(true));
        result.insert("path".to_string(), path.into());
        result.insert("label".to_string(), label.into());

        Ok(ToolOutput::success(
            serde_json::Value::Object(result),
            start.elapsed().max(Duration::from_millis(1)),
        ))
    }
}
