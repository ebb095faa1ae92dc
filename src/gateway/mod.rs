//! HTTP gateway.
//!
//! Exposes turn submission and conversation subscriptions as SSE streams,
//! plus the entry points external actors use to complete pending work:
//! remote tool results and confirmation answers.

pub mod auth;
pub mod types;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use futures::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::conversation::ConversationState;
use crate::error::GatewayError;
use crate::events::{Broadcaster, EventEmitter, EventHub, EventKind, StreamEvent};
use crate::gateway::auth::{AuthState, AuthUser, auth_middleware};
use crate::gateway::types::{
    ConfirmationRequest, ConfirmationResponse, ConnectionQuery, HealthResponse, ModeRequest,
    SendMessageRequest, ToolResultResponse,
};
use crate::turn::{ToolResultSubmission, TurnProcessor, TurnRequest, submit_tool_result};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub processor: Arc<TurnProcessor>,
    pub hub: Arc<EventHub>,
    pub auth: AuthState,
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/conversations/{id}/messages", post(send_message))
        .route("/conversations/{id}/events", get(subscribe_events))
        .route("/conversations/{id}/tool-results", post(submit_tool_result_handler))
        .route("/conversations/{id}/mode", post(set_mode))
        .route("/conversations/{id}/typing", post(typing))
        .route("/confirmations/{id}", post(resolve_confirmation))
        .route_layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        // Unauthenticated routes (added after the layer).
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve the gateway.
pub async fn serve(state: GatewayState, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

fn to_sse(event: StreamEvent) -> Result<Event, Infallible> {
    let data = serde_json::to_string(&event).unwrap_or_default();
    Ok(Event::default().event(event.event_type()).data(data))
}

fn sse_response<S>(stream: S) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    Sse::new(stream.map(to_sse)).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text(""))
}

// -- Handlers --
//
// Everything except /health is behind auth_middleware, so handlers can rely
// on the AuthUser extension.

async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        subscribers: state.hub.connection_count(),
    })
}

/// Run a turn. The response streams that turn's events and ends with it.
async fn send_message(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>, GatewayError> {
    if req.retry_from.is_none() && req.content.trim().is_empty() {
        return Err(GatewayError::BadRequest("message content is empty".to_string()));
    }
    // Reject a bad manifest before any event is streamed.
    state.processor.deps().catalog.dispatch_table(&req.client_tools)?;

    let connection_id = req.connection_id.unwrap_or_else(Uuid::new_v4);
    let broadcaster: Arc<dyn Broadcaster> = state.hub.clone();
    let (emitter, rx) = EventEmitter::new(conversation_id, broadcaster).with_origin(connection_id);

    let request = TurnRequest {
        conversation_id,
        user_id,
        content: req.content,
        retry_from: req.retry_from,
        remote_tools: req.client_tools,
    };
    tracing::info!(
        conversation_id = %conversation_id,
        user_id,
        retry = request.retry_from.is_some(),
        "Turn submitted"
    );

    // The turn outlives the HTTP response if the client goes away.
    let processor = Arc::clone(&state.processor);
    tokio::spawn(async move {
        let _ = processor.process(request, emitter).await;
    });

    Ok(sse_response(UnboundedReceiverStream::new(rx)))
}

/// Subscribe to a conversation's events.
async fn subscribe_events(
    State(state): State<GatewayState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<ConnectionQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>, GatewayError> {
    let connection_id = query.connection_id.unwrap_or_else(Uuid::new_v4);
    let stream = state
        .hub
        .subscribe(conversation_id, connection_id)
        .ok_or(GatewayError::TooManySubscribers)?;
    Ok(sse_response(stream))
}

async fn submit_tool_result_handler(
    State(state): State<GatewayState>,
    Path(conversation_id): Path<Uuid>,
    Json(submission): Json<ToolResultSubmission>,
) -> Result<Json<ToolResultResponse>, GatewayError> {
    let remote_calls = &state.processor.deps().router.remote_calls;
    let tool_call_id = submission.tool_call_id.clone();

    submit_tool_result(remote_calls, conversation_id, submission)
        .await
        .map_err(|_| GatewayError::NotFound(format!("No pending tool call '{}'", tool_call_id)))?;
    tracing::debug!(conversation_id = %conversation_id, call_id = %tool_call_id, "Tool result accepted");

    Ok(Json(ToolResultResponse {
        tool_call_id,
        status: "accepted",
    }))
}

async fn set_mode(
    State(state): State<GatewayState>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<ConversationState>, GatewayError> {
    let store = &state.processor.deps().router.store;
    store.ensure_conversation(conversation_id).await?;
    let updated = store.set_mode(conversation_id, req.mode).await?;
    tracing::info!(conversation_id = %conversation_id, mode = %req.mode, "Mode changed");

    let broadcaster: Arc<dyn Broadcaster> = state.hub.clone();
    EventEmitter::new(conversation_id, broadcaster).emit(EventKind::ModeChange { mode: req.mode });
    Ok(Json(updated))
}

async fn typing(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<ConnectionQuery>,
) -> axum::http::StatusCode {
    // Nobody listening is fine.
    let _ = state.hub.publish(
        conversation_id,
        query.connection_id,
        StreamEvent::new(EventKind::Typing { user_id }),
    );
    axum::http::StatusCode::NO_CONTENT
}

async fn resolve_confirmation(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(confirmation_id): Path<String>,
    Json(req): Json<ConfirmationRequest>,
) -> Result<Json<ConfirmationResponse>, GatewayError> {
    let outcome = state
        .processor
        .deps()
        .router
        .confirmations
        .resolve(&confirmation_id, req.approved, user_id)
        .await?;

    Ok(Json(ConfirmationResponse {
        confirmation_id: outcome.confirmation_id,
        approved: outcome.approved,
        delivered: outcome.delivered,
    }))
}
