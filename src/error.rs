//! Error types for turnstile.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Conversation store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error("Message {message_id} not found in conversation {conversation_id}")]
    MessageNotFound {
        conversation_id: Uuid,
        message_id: Uuid,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the pending call registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PendingError {
    #[error("No pending entry for '{0}'")]
    NotFound(String),

    #[error("A pending entry for '{0}' is already live")]
    Duplicate(String),

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Pending entry cancelled")]
    Cancelled,
}

/// Tool catalog construction errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Tool '{0}' is declared more than once")]
    DuplicateTool(String),

    #[error("Tool name '{0}' is reserved")]
    ReservedName(String),

    #[error("Unknown tool '{0}' in destructive set")]
    UnknownTool(String),

    #[error("Tool '{0}' is marked destructive but does not mutate state")]
    NotMutation(String),
}

/// Agent invocation errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent environment setup failed: {0}")]
    Setup(String),

    #[error("Agent stream failed: {0}")]
    Stream(String),
}

/// Confirmation resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfirmationError {
    #[error("Confirmation '{0}' not found")]
    NotFound(String),

    #[error("User {requesting_user} may not resolve confirmation '{confirmation_id}'")]
    Forbidden {
        confirmation_id: String,
        requesting_user: i64,
    },
}

/// Turn-fatal errors.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Tool catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Event fan-out errors.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("No live subscribers")]
    NoSubscribers,

    #[error("Broadcaster closed: {0}")]
    Closed(String),
}

/// Errors returned by the HTTP gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too many subscribers")]
    TooManySubscribers,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ConfirmationError> for GatewayError {
    fn from(err: ConfirmationError) -> Self {
        match err {
            ConfirmationError::NotFound(_) => GatewayError::NotFound(err.to_string()),
            ConfirmationError::Forbidden { .. } => GatewayError::Forbidden(err.to_string()),
        }
    }
}

impl From<CatalogError> for GatewayError {
    fn from(err: CatalogError) -> Self {
        GatewayError::BadRequest(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::NotFound(_) | GatewayError::Store(StoreError::ConversationNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::TooManySubscribers => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Result type for turn processing.
pub type Result<T> = std::result::Result<T, TurnError>;
