//! Per-turn tool router.
//!
//! Every tool call the agent makes during a turn lands in
//! [`ToolRouter::run_tool`]. The router intercepts `update_plan`, runs the
//! mode/phase gate for mutation tools, and hands the call to a server
//! handler, the remote client, or nobody.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::PendingError;
use crate::events::{EventEmitter, EventKind};
use crate::gate::{self, GateDecision, Mode, Phase};
use crate::pending::{OnTimeout, PendingRegistry};
use crate::store::ConversationStore;
use crate::tools::{DispatchTable, Tool, ToolCall, ToolContext, ToolError, ToolRoute, UPDATE_PLAN_TOOL};
use crate::turn::confirmation::ConfirmationWorkflow;
use crate::turn::plan::UpdatePlanArgs;

/// A tool call waiting on the remote client.
#[derive(Debug, Clone)]
pub struct RemoteCall {
    pub conversation_id: Uuid,
    pub call: ToolCall,
}

/// Remote calls in flight, keyed by tool call id.
pub type RemoteCalls = PendingRegistry<RemoteCall>;

/// A remote client's answer to a `tool_call_request`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultSubmission {
    pub tool_call_id: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Registry key of a remote call. Tool call ids are only unique within a
/// conversation, so the conversation is part of the key.
pub fn remote_call_key(conversation_id: Uuid, tool_call_id: &str) -> String {
    format!("{}:{}", conversation_id, tool_call_id)
}

/// Complete a remote call of `conversation_id`. Unknown or already
/// completed ids, and ids belonging to another conversation, report
/// [`PendingError::NotFound`].
pub async fn submit_tool_result(
    remote_calls: &RemoteCalls,
    conversation_id: Uuid,
    submission: ToolResultSubmission,
) -> Result<(), PendingError> {
    let key = remote_call_key(conversation_id, &submission.tool_call_id);
    match submission.error {
        Some(error) => remote_calls.reject(&key, error).await,
        None => remote_calls.resolve(&key, submission.output).await,
    }
}

/// Run a server handler, folding failures into text for the agent.
pub(crate) async fn execute_server_tool(tool: &dyn Tool, call: &ToolCall, ctx: &ToolContext) -> String {
    match tool.execute(call.params(), ctx).await {
        Ok(output) => {
            tracing::debug!(
                tool = %call.name,
                call_id = %call.id,
                duration_ms = output.duration.as_millis() as u64,
                "Tool completed"
            );
            output.into_text()
        }
        Err(e) => {
            tracing::info!(tool = %call.name, call_id = %call.id, "Tool failed: {}", e);
            format!("Error: {} failed: {}", call.name, e)
        }
    }
}

/// Shared pieces a router needs beyond the turn itself.
#[derive(Clone)]
pub struct RouterDeps {
    pub store: Arc<dyn ConversationStore>,
    pub remote_calls: Arc<RemoteCalls>,
    pub confirmations: Arc<ConfirmationWorkflow>,
    pub pending_timeout: Duration,
}

/// Tool dispatcher bound to one turn.
pub struct ToolRouter {
    ctx: ToolContext,
    mode: Mode,
    /// Phase as seen by this turn. Starts from the persisted state and
    /// follows successful `update_plan` calls.
    phase: Mutex<Phase>,
    table: DispatchTable,
    emitter: EventEmitter,
    deps: RouterDeps,
}

impl ToolRouter {
    pub fn new(
        ctx: ToolContext,
        mode: Mode,
        phase: Phase,
        table: DispatchTable,
        emitter: EventEmitter,
        deps: RouterDeps,
    ) -> Self {
        Self {
            ctx,
            mode,
            phase: Mutex::new(phase),
            table,
            emitter,
            deps,
        }
    }

    /// Current shadow phase.
    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Run one tool call for the agent.
    ///
    /// Gate blocks, denials and handler failures come back as `Ok` text.
    /// `Err` is reserved for remote calls that failed or never answered.
    pub async fn run_tool(&self, call: ToolCall) -> Result<String, ToolError> {
        if call.name == UPDATE_PLAN_TOOL {
            return Ok(self.update_plan(&call).await);
        }

        let class = self.table.classify(&call.name);
        let phase = self.phase();
        match gate::decide(self.mode.definition(), phase, &call.name, class) {
            GateDecision::Proceed => {}
            GateDecision::Block(message) => {
                tracing::info!(
                    conversation_id = %self.ctx.conversation_id,
                    tool = %call.name,
                    mode = %self.mode,
                    phase = %phase,
                    "Mutation blocked by gate"
                );
                return Ok(message);
            }
            GateDecision::RequireConfirmation => {
                return Ok(self
                    .deps
                    .confirmations
                    .request(&call, self.ctx, &self.emitter)
                    .await);
            }
        }

        self.dispatch(call).await
    }

    async fn update_plan(&self, call: &ToolCall) -> String {
        let args = match UpdatePlanArgs::parse(&call.arguments) {
            Ok(args) => args,
            Err(e) => return format!("Error: invalid {} arguments: {}", UPDATE_PLAN_TOOL, e),
        };

        if let Err(e) = self
            .deps
            .store
            .set_plan(self.ctx.conversation_id, &args.plan, args.phase)
            .await
        {
            tracing::warn!(
                conversation_id = %self.ctx.conversation_id,
                "Failed to persist plan: {}",
                e
            );
            return format!("Error: the plan could not be saved: {}", e);
        }

        self.set_phase(args.phase);
        tracing::debug!(
            conversation_id = %self.ctx.conversation_id,
            phase = %args.phase,
            "Plan updated"
        );
        self.emitter.emit(EventKind::PlanUpdate {
            plan: args.plan,
            phase: args.phase,
        });
        format!("Plan saved. Current phase: {}.", args.phase)
    }

    async fn dispatch(&self, call: ToolCall) -> Result<String, ToolError> {
        match self.table.route(&call.name) {
            ToolRoute::Server(tool) => Ok(execute_server_tool(tool.as_ref(), &call, &self.ctx).await),
            ToolRoute::Remote => self.dispatch_remote(call).await,
            ToolRoute::Unavailable => {
                tracing::debug!(tool = %call.name, "No executor for tool");
                Ok(format!("Tool '{}' is not available.", call.name))
            }
        }
    }

    async fn dispatch_remote(&self, call: ToolCall) -> Result<String, ToolError> {
        let handle = self
            .deps
            .remote_calls
            .register(
                remote_call_key(self.ctx.conversation_id, &call.id),
                RemoteCall {
                    conversation_id: self.ctx.conversation_id,
                    call: call.clone(),
                },
                Some(self.ctx.user_id),
                self.deps.pending_timeout,
                OnTimeout::Reject,
            )
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        tracing::debug!(
            conversation_id = %self.ctx.conversation_id,
            tool = %call.name,
            call_id = %call.id,
            "Dispatching tool to remote client"
        );
        self.emitter.emit(EventKind::ToolCallRequest { tool_call: call });

        match handle.wait().await {
            Ok(output) => Ok(output),
            Err(PendingError::TimedOut(after)) => Err(ToolError::Timeout(after)),
            Err(PendingError::Rejected(reason)) => Err(ToolError::Remote(reason)),
            Err(e) => Err(ToolError::ExecutionFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::conversation::{ChatMessage, ConversationState};
    use crate::error::{BroadcastError, StoreError};
    use crate::events::{Broadcaster, StreamEvent};
    use crate::store::InMemoryStore;
    use crate::tools::{RemoteToolSpec, ToolCatalog, ToolOutput, ToolRegistry};

    struct NullBroadcaster;

    impl Broadcaster for NullBroadcaster {
        fn publish(&self, _: Uuid, _: Option<Uuid>, _: StreamEvent) -> Result<usize, BroadcastError> {
            Err(BroadcastError::NoSubscribers)
        }
    }

    #[derive(Default)]
    struct Publish {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Tool for Publish {
        fn name(&self) -> &str {
            "publish_article"
        }

        fn description(&self) -> &str {
            "Publish an article"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(
            &self,
            _params: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::text("published", Duration::ZERO))
        }

        fn is_mutation(&self) -> bool {
            true
        }
    }

    /// Store whose plan writes always fail.
    struct BrokenPlanStore(InMemoryStore);

    #[async_trait]
    impl ConversationStore for BrokenPlanStore {
        async fn ensure_conversation(&self, id: Uuid) -> Result<ConversationState, StoreError> {
            self.0.ensure_conversation(id).await
        }
        async fn state(&self, id: Uuid) -> Result<ConversationState, StoreError> {
            self.0.state(id).await
        }
        async fn set_plan(&self, _id: Uuid, _plan: &str, _phase: Phase) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        async fn set_mode(&self, id: Uuid, mode: Mode) -> Result<ConversationState, StoreError> {
            self.0.set_mode(id, mode).await
        }
        async fn messages(&self, id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
            self.0.messages(id).await
        }
        async fn append_messages(&self, id: Uuid, messages: &[ChatMessage]) -> Result<(), StoreError> {
            self.0.append_messages(id, messages).await
        }
        async fn truncate_after(&self, id: Uuid, message_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
            self.0.truncate_after(id, message_id).await
        }
    }

    struct Fixture {
        router: ToolRouter,
        tool: Arc<Publish>,
        conversation_id: Uuid,
        remote_calls: Arc<RemoteCalls>,
        events: mpsc::UnboundedReceiver<StreamEvent>,
    }

    async fn fixture(mode: Mode, store: Arc<dyn ConversationStore>) -> Fixture {
        fixture_sharing(mode, store, Arc::new(RemoteCalls::new("remote_calls"))).await
    }

    /// A router for a fresh conversation using an existing remote registry.
    async fn fixture_sharing(
        mode: Mode,
        store: Arc<dyn ConversationStore>,
        remote_calls: Arc<RemoteCalls>,
    ) -> Fixture {
        let tool = Arc::new(Publish::default());
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone()).unwrap();
        let catalog = Arc::new(ToolCatalog::new(registry, ["publish_article"]).unwrap());
        let table = catalog
            .dispatch_table(&[RemoteToolSpec::named("read_selection")])
            .unwrap();

        let conversation_id = Uuid::new_v4();
        store.ensure_conversation(conversation_id).await.unwrap();
        let deps = RouterDeps {
            store,
            remote_calls: remote_calls.clone(),
            confirmations: Arc::new(ConfirmationWorkflow::new(catalog, Duration::from_secs(300))),
            pending_timeout: Duration::from_secs(300),
        };
        let (emitter, events) = EventEmitter::new(conversation_id, Arc::new(NullBroadcaster))
            .with_origin(Uuid::new_v4());
        let router = ToolRouter::new(
            ToolContext {
                conversation_id,
                user_id: 1,
            },
            mode,
            Phase::Planning,
            table,
            emitter,
            deps,
        );
        Fixture {
            router,
            tool,
            conversation_id,
            remote_calls,
            events,
        }
    }

    fn plan_call(phase: &str) -> ToolCall {
        ToolCall::new(
            "plan_1",
            UPDATE_PLAN_TOOL,
            serde_json::json!({"plan": "1. Publish the article", "phase": phase}),
        )
    }

    fn publish_call() -> ToolCall {
        ToolCall::new("call_p", "publish_article", serde_json::json!({"id": "42"}))
    }

    #[tokio::test]
    async fn test_plan_mode_blocks_mutation_while_planning() {
        let f = fixture(Mode::Plan, Arc::new(InMemoryStore::new())).await;

        let result = f.router.run_tool(publish_call()).await.unwrap();
        assert!(result.starts_with("Blocked"));
        assert!(result.contains("update_plan"));
        assert_eq!(f.tool.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_plan_unblocks_later_mutations() {
        let mut f = fixture(Mode::Plan, Arc::new(InMemoryStore::new())).await;

        f.router.run_tool(plan_call("executing")).await.unwrap();
        assert_eq!(f.router.phase(), Phase::Executing);
        let event = f.events.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::PlanUpdate { phase: Phase::Executing, .. }));

        let result = f.router.run_tool(publish_call()).await.unwrap();
        assert_eq!(result, "published");
        assert_eq!(f.tool.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_update_plan_keeps_phase() {
        let mut f = fixture(Mode::Plan, Arc::new(InMemoryStore::new())).await;

        let bad = ToolCall::new(
            "plan_1",
            UPDATE_PLAN_TOOL,
            serde_json::json!({"plan": "", "phase": "executing"}),
        );
        let result = f.router.run_tool(bad).await.unwrap();
        assert!(result.starts_with("Error"));
        assert_eq!(f.router.phase(), Phase::Planning);
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_plan_persist_keeps_phase() {
        let f = fixture(Mode::Plan, Arc::new(BrokenPlanStore(InMemoryStore::new()))).await;

        let result = f.router.run_tool(plan_call("executing")).await.unwrap();
        assert!(result.contains("could not be saved"));
        assert_eq!(f.router.phase(), Phase::Planning);

        let blocked = f.router.run_tool(publish_call()).await.unwrap();
        assert!(blocked.starts_with("Blocked"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_available() {
        let f = fixture(Mode::ExecAcceptAll, Arc::new(InMemoryStore::new())).await;
        let result = f
            .router
            .run_tool(ToolCall::new("c", "launch_rocket", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(result, "Tool 'launch_rocket' is not available.");
    }

    #[tokio::test]
    async fn test_remote_call_round_trip() {
        let Fixture {
            router,
            conversation_id,
            remote_calls,
            mut events,
            ..
        } = fixture(Mode::Plan, Arc::new(InMemoryStore::new())).await;
        let router = Arc::new(router);

        let r = Arc::clone(&router);
        let task = tokio::spawn(async move {
            r.run_tool(ToolCall::new("call_r", "read_selection", serde_json::json!({})))
                .await
        });

        let event = events.recv().await.unwrap();
        let EventKind::ToolCallRequest { tool_call } = event.kind else {
            panic!("expected tool_call_request");
        };
        assert_eq!(tool_call.id, "call_r");

        submit_tool_result(
            &remote_calls,
            conversation_id,
            ToolResultSubmission {
                tool_call_id: "call_r".into(),
                output: "selected text".into(),
                error: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(task.await.unwrap().unwrap(), "selected text");
    }

    #[tokio::test]
    async fn test_same_call_id_in_two_conversations() {
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new());
        let shared = Arc::new(RemoteCalls::new("remote_calls"));
        let mut a = fixture_sharing(Mode::Plan, store.clone(), shared.clone()).await;
        let mut b = fixture_sharing(Mode::Plan, store, shared.clone()).await;
        let (convo_a, convo_b) = (a.conversation_id, b.conversation_id);
        let router_a = Arc::new(a.router);
        let router_b = Arc::new(b.router);

        let r = Arc::clone(&router_a);
        let task_a = tokio::spawn(async move {
            r.run_tool(ToolCall::new("call_1", "read_selection", serde_json::json!({})))
                .await
        });
        a.events.recv().await.unwrap();

        let r = Arc::clone(&router_b);
        let task_b = tokio::spawn(async move {
            r.run_tool(ToolCall::new("call_1", "read_selection", serde_json::json!({})))
                .await
        });
        let event = b.events.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::ToolCallRequest { .. }));
        assert_eq!(shared.len().await, 2);

        let answer = |output: &str| ToolResultSubmission {
            tool_call_id: "call_1".into(),
            output: output.into(),
            error: None,
        };
        submit_tool_result(&shared, convo_b, answer("from b")).await.unwrap();
        assert_eq!(task_b.await.unwrap().unwrap(), "from b");
        assert!(shared.contains(&remote_call_key(convo_a, "call_1")).await);

        submit_tool_result(&shared, convo_a, answer("from a")).await.unwrap();
        assert_eq!(task_a.await.unwrap().unwrap(), "from a");
        assert!(shared.is_empty().await);
    }

    #[tokio::test]
    async fn test_result_for_other_conversation_is_not_found() {
        let Fixture {
            router,
            conversation_id,
            remote_calls,
            mut events,
            ..
        } = fixture(Mode::Plan, Arc::new(InMemoryStore::new())).await;
        let router = Arc::new(router);

        let r = Arc::clone(&router);
        let task = tokio::spawn(async move {
            r.run_tool(ToolCall::new("call_r", "read_selection", serde_json::json!({})))
                .await
        });
        events.recv().await.unwrap();

        let submission = ToolResultSubmission {
            tool_call_id: "call_r".into(),
            output: "selected text".into(),
            error: None,
        };
        let misrouted = submit_tool_result(&remote_calls, Uuid::new_v4(), submission.clone()).await;
        assert!(matches!(misrouted, Err(PendingError::NotFound(_))));

        submit_tool_result(&remote_calls, conversation_id, submission).await.unwrap();
        assert_eq!(task.await.unwrap().unwrap(), "selected text");
    }

    #[tokio::test]
    async fn test_remote_error_fails_the_call() {
        let Fixture {
            router,
            conversation_id,
            remote_calls,
            mut events,
            ..
        } = fixture(Mode::Plan, Arc::new(InMemoryStore::new())).await;
        let router = Arc::new(router);

        let r = Arc::clone(&router);
        let task = tokio::spawn(async move {
            r.run_tool(ToolCall::new("call_r", "read_selection", serde_json::json!({})))
                .await
        });
        events.recv().await.unwrap();

        submit_tool_result(
            &remote_calls,
            conversation_id,
            ToolResultSubmission {
                tool_call_id: "call_r".into(),
                output: String::new(),
                error: Some("no editor open".into()),
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            task.await.unwrap(),
            Err(ToolError::Remote(reason)) if reason == "no editor open"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_timeout_fails_and_forgets_entry() {
        let Fixture {
            router,
            conversation_id,
            remote_calls,
            mut events,
            ..
        } = fixture(Mode::Plan, Arc::new(InMemoryStore::new())).await;
        let router = Arc::new(router);

        let r = Arc::clone(&router);
        let task = tokio::spawn(async move {
            r.run_tool(ToolCall::new("call_r", "read_selection", serde_json::json!({})))
                .await
        });
        events.recv().await.unwrap();

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(matches!(task.await.unwrap(), Err(ToolError::Timeout(_))));

        let late = submit_tool_result(
            &remote_calls,
            conversation_id,
            ToolResultSubmission {
                tool_call_id: "call_r".into(),
                output: "too late".into(),
                error: None,
            },
        )
        .await;
        assert!(matches!(late, Err(PendingError::NotFound(_))));
        assert!(remote_calls.is_empty().await);
    }

    #[tokio::test]
    async fn test_exec_accept_all_confirms_destructive() {
        let mut f = fixture(Mode::ExecAcceptAll, Arc::new(InMemoryStore::new())).await;
        let router = Arc::new(f.router);
        let confirmations = Arc::clone(&router.deps.confirmations);

        let r = Arc::clone(&router);
        let task = tokio::spawn(async move { r.run_tool(publish_call()).await });

        let event = f.events.recv().await.unwrap();
        let EventKind::ConfirmationRequired { confirmation } = event.kind else {
            panic!("expected confirmation_required");
        };
        assert_eq!(confirmation.tool_name, "publish_article");
        assert_eq!(f.tool.runs.load(Ordering::SeqCst), 0);

        confirmations.resolve(&confirmation.id, true, 1).await.unwrap();
        assert_eq!(task.await.unwrap().unwrap(), "published");
        assert_eq!(f.tool.runs.load(Ordering::SeqCst), 1);
    }
}
