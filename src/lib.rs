//! Turn orchestration and tool-call gating for conversational agents.
//!
//! A turn runs an opaque [`agent::Agent`] against a conversation. Every tool
//! call it makes goes through a per-turn [`turn::ToolRouter`], which applies
//! the mode/phase [`gate`], parks calls that need a remote client or a human
//! in a [`pending::PendingRegistry`], and streams progress as
//! [`events::StreamEvent`]s to every subscriber of the conversation.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod gate;
pub mod gateway;
pub mod pending;
pub mod store;
pub mod tools;
pub mod turn;

pub use config::Config;
pub use error::{Result, TurnError};
