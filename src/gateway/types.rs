//! Request and response DTOs for the gateway API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gate::Mode;
use crate::tools::RemoteToolSpec;

// --- Turns ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    /// Tools the client will run itself when asked.
    #[serde(default)]
    pub client_tools: Vec<RemoteToolSpec>,
    /// Replay the turn after this message instead of adding a new one.
    pub retry_from: Option<Uuid>,
    /// The caller's event subscription, so it is not sent the same events twice.
    pub connection_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionQuery {
    pub connection_id: Option<Uuid>,
}

// --- Tool results ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultResponse {
    pub tool_call_id: String,
    pub status: &'static str,
}

// --- Confirmations ---

#[derive(Debug, Deserialize)]
pub struct ConfirmationRequest {
    pub approved: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResponse {
    pub confirmation_id: String,
    pub approved: bool,
    /// False if the turn that asked was no longer waiting.
    pub delivered: bool,
}

// --- Mode ---

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: Mode,
}

// --- Health ---

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub subscribers: u64,
}
