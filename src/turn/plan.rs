//! The `update_plan` tool and the per-turn plan reminder.

use serde::Deserialize;

use crate::conversation::ConversationState;
use crate::gate::Phase;
use crate::tools::{ToolSchema, UPDATE_PLAN_TOOL};

/// Validated `update_plan` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdatePlanArgs {
    pub plan: String,
    pub phase: Phase,
}

impl UpdatePlanArgs {
    pub fn parse(arguments: &serde_json::Map<String, serde_json::Value>) -> Result<Self, String> {
        let args: UpdatePlanArgs =
            serde_json::from_value(serde_json::Value::Object(arguments.clone()))
                .map_err(|e| e.to_string())?;
        if args.plan.trim().is_empty() {
            return Err("'plan' must not be empty".to_string());
        }
        Ok(args)
    }
}

/// Schema advertised to the agent for `update_plan`.
pub fn update_plan_schema() -> ToolSchema {
    ToolSchema {
        name: UPDATE_PLAN_TOOL.to_string(),
        description: "Save the current plan and its phase. Use phase 'planning' while the plan \
                      is being agreed, 'executing' once the user approved it, and 'complete' \
                      when every step is done."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "plan": {
                    "type": "string",
                    "description": "The full plan as a numbered list of steps"
                },
                "phase": {
                    "type": "string",
                    "enum": ["planning", "executing", "complete"]
                }
            },
            "required": ["plan", "phase"]
        }),
    }
}

/// Ephemeral reminder appended to the history of every turn. Never persisted.
pub fn reminder(state: &ConversationState) -> String {
    let has_plan = state
        .plan
        .as_deref()
        .is_some_and(|plan| !plan.trim().is_empty());

    let body = match (has_plan, state.plan_phase) {
        (false, _) => "There is no plan yet. Before doing anything else, call update_plan with \
                       a numbered plan and phase \"planning\"."
            .to_string(),
        (true, Phase::Planning) => "A plan exists and is still being agreed. Refine it with \
                                    update_plan if needed and end your reply by asking the user \
                                    explicitly whether they approve it. Only after they approve, \
                                    call update_plan with phase \"executing\"."
            .to_string(),
        (true, Phase::Executing) => "The approved plan is being executed. Report progress on \
                                     each step with update_plan. Move to phase \"complete\" only \
                                     once every step is done."
            .to_string(),
        (true, Phase::Complete) => "The current plan is complete. If the user asks for new work, \
                                    start a new plan with update_plan and phase \"planning\"."
            .to_string(),
    };

    format!(
        "<reminder mode=\"{}\" phase=\"{}\">{}</reminder>",
        state.mode, state.plan_phase, body
    )
}
