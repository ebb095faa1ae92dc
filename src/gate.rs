//! Mode/phase gate for mutation tools.
//!
//! ```text
//! ┌──────────────────┬──────────────────────┬──────────────────────────┐
//! │ Mode             │ Mutation policy      │ Mutations run when       │
//! ├──────────────────┼──────────────────────┼──────────────────────────┤
//! │ plan             │ Blocked              │ phase = executing        │
//! │ exec             │ Confirm              │ after user approval      │
//! │ exec-accept-all  │ ConfirmDestructive   │ destructive: approval    │
//! │                  │                      │ others: immediately      │
//! └──────────────────┴──────────────────────┴──────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Conversation mode, chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Plan,
    Exec,
    ExecAcceptAll,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Plan => "plan",
            Mode::Exec => "exec",
            Mode::ExecAcceptAll => "exec-accept-all",
        }
    }

    /// Static policy for this mode.
    pub fn definition(&self) -> &'static ModeDefinition {
        match self {
            Mode::Plan => &PLAN_MODE,
            Mode::Exec => &EXEC_MODE,
            Mode::ExecAcceptAll => &EXEC_ACCEPT_ALL_MODE,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(Mode::Plan),
            "exec" => Ok(Mode::Exec),
            "exec-accept-all" => Ok(Mode::ExecAcceptAll),
            _ => Err(format!(
                "invalid mode '{}', expected 'plan', 'exec', or 'exec-accept-all'",
                s
            )),
        }
    }
}

/// Lifecycle stage of the conversation's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Planning,
    Executing,
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Executing => "executing",
            Phase::Complete => "complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a mode treats mutation tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPolicy {
    /// Mutations only run in the allowed phases.
    Blocked,
    /// Every mutation needs user approval.
    Confirm,
    /// Only destructive mutations need user approval.
    ConfirmDestructive,
}

/// Static per-mode policy.
#[derive(Debug, PartialEq, Eq)]
pub struct ModeDefinition {
    pub mode: Mode,
    pub mutation_policy: MutationPolicy,
    pub mutation_allowed_phases: &'static [Phase],
}

const ALL_PHASES: &[Phase] = &[Phase::Planning, Phase::Executing, Phase::Complete];

static PLAN_MODE: ModeDefinition = ModeDefinition {
    mode: Mode::Plan,
    mutation_policy: MutationPolicy::Blocked,
    mutation_allowed_phases: &[Phase::Executing],
};

static EXEC_MODE: ModeDefinition = ModeDefinition {
    mode: Mode::Exec,
    mutation_policy: MutationPolicy::Confirm,
    mutation_allowed_phases: ALL_PHASES,
};

static EXEC_ACCEPT_ALL_MODE: ModeDefinition = ModeDefinition {
    mode: Mode::ExecAcceptAll,
    mutation_policy: MutationPolicy::ConfirmDestructive,
    mutation_allowed_phases: ALL_PHASES,
};

/// How a tool affects external state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    ReadOnly,
    Mutation,
    Destructive,
}

/// Outcome of gating a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Block(String),
    RequireConfirmation,
}

/// Decide whether a tool call may run right now.
///
/// `phase` must be the in-turn phase, not the one read at turn start, so a
/// plan approved earlier in the same turn unlocks later mutations.
pub fn decide(mode: &ModeDefinition, phase: Phase, tool_name: &str, class: ToolClass) -> GateDecision {
    if class == ToolClass::ReadOnly {
        return GateDecision::Proceed;
    }

    match mode.mutation_policy {
        MutationPolicy::Blocked => {
            if mode.mutation_allowed_phases.contains(&phase) {
                GateDecision::Proceed
            } else {
                GateDecision::Block(block_message(mode.mode, phase, tool_name))
            }
        }
        MutationPolicy::Confirm => GateDecision::RequireConfirmation,
        MutationPolicy::ConfirmDestructive => {
            if class == ToolClass::Destructive {
                GateDecision::RequireConfirmation
            } else {
                GateDecision::Proceed
            }
        }
    }
}

fn block_message(mode: Mode, phase: Phase, tool_name: &str) -> String {
    format!(
        "Blocked: '{}' changes content, and this conversation is in {} mode with the plan in the \
         {} phase. Write a plan with update_plan, ask the user to approve it, then call \
         update_plan with phase \"executing\" before making changes.",
        tool_name, mode, phase
    )
}
