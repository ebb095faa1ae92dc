//! Tool system.
//!
//! Tools run either on the server (registered [`Tool`] handlers) or on the
//! connected client (declared per turn in a remote manifest). The
//! [`DispatchTable`] decides which, and classifies each tool for the gate.

pub mod builtin;

mod registry;
mod tool;

pub use registry::{
    DispatchTable, RemoteToolSpec, ToolCatalog, ToolRegistry, ToolRoute, UPDATE_PLAN_TOOL,
};
pub use tool::{Tool, ToolCall, ToolContext, ToolError, ToolOutput, ToolSchema};
