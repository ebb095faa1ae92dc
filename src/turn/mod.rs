//! Agent turn orchestration.

pub mod confirmation;
pub mod navigation;
pub mod plan;
pub mod processor;
pub mod router;

pub use confirmation::{ConfirmationOutcome, ConfirmationWorkflow};
pub use processor::{TurnDeps, TurnProcessor, TurnRequest, TurnState, TurnSummary};
pub use router::{
    RemoteCall, RemoteCalls, RouterDeps, ToolResultSubmission, ToolRouter, remote_call_key,
    submit_tool_result,
};
