//! Notes tools.
//!
//! A per-conversation scratch notebook held in memory. `create_note` and
//! `delete_note` change state and therefore go through the gate;
//! `delete_note` is the bundled server's only destructive tool.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput};

/// Notes keyed by conversation, then by title.
#[derive(Debug, Default)]
pub struct NoteBook {
    notes: RwLock<HashMap<Uuid, BTreeMap<String, String>>>,
}

impl NoteBook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn titles(&self, conversation_id: Uuid) -> Vec<String> {
        self.notes
            .read()
            .await
            .get(&conversation_id)
            .map(|notes| notes.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{}' parameter", key)))
}

/// Create or overwrite a note.
#[derive(Debug)]
pub struct CreateNoteTool {
    book: Arc<NoteBook>,
}

impl CreateNoteTool {
    pub fn new(book: Arc<NoteBook>) -> Self {
        Self { book }
    }
}

#[async_trait]
impl Tool for CreateNoteTool {
    fn name(&self) -> &str {
        "create_note"
    }

    fn description(&self) -> &str {
        "Create a note in this conversation's notebook, replacing any note with the same title."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "body": { "type": "string" }
            },
            "required": ["title", "body"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let title = require_str(&params, "title")?;
        let body = params.get("body").and_then(|v| v.as_str()).unwrap_or_default();

        let replaced = self
            .book
            .notes
            .write()
            .await
            .entry(ctx.conversation_id)
            .or_default()
            .insert(title.to_string(), body.to_string())
            .is_some();

        Ok(ToolOutput::success(
            serde_json::json!({ "title": title, "replaced": replaced }),
            start.elapsed(),
        ))
    }

    fn is_mutation(&self) -> bool {
        true
    }
}

/// Delete a note.
#[derive(Debug)]
pub struct DeleteNoteTool {
    book: Arc<NoteBook>,
}

impl DeleteNoteTool {
    pub fn new(book: Arc<NoteBook>) -> Self {
        Self { book }
    }
}

#[async_trait]
impl Tool for DeleteNoteTool {
    fn name(&self) -> &str {
        "delete_note"
    }

    fn description(&self) -> &str {
        "Permanently delete a note from this conversation's notebook."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" }
            },
            "required": ["title"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let title = require_str(&params, "title")?;

        let removed = self
            .book
            .notes
            .write()
            .await
            .get_mut(&ctx.conversation_id)
            .and_then(|notes| notes.remove(title));
        match removed {
            Some(_) => Ok(ToolOutput::text(format!("Deleted note '{}'.", title), start.elapsed())),
            None => Err(ToolError::ExecutionFailed(format!("no note titled '{}'", title))),
        }
    }

    fn is_mutation(&self) -> bool {
        true
    }

    fn describe_call(&self, params: &serde_json::Value) -> Option<String> {
        let title = params.get("title")?.as_str()?;
        Some(format!("Permanently delete note '{}'", title))
    }
}

/// List note titles. Read-only.
#[derive(Debug)]
pub struct ListNotesTool {
    book: Arc<NoteBook>,
}

impl ListNotesTool {
    pub fn new(book: Arc<NoteBook>) -> Self {
        Self { book }
    }
}

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "list_notes"
    }

    fn description(&self) -> &str {
        "List the titles of the notes in this conversation's notebook."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let titles = self.book.titles(ctx.conversation_id).await;
        Ok(ToolOutput::success(serde_json::json!(titles), start.elapsed()))
    }
}
