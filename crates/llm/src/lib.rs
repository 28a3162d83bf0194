//! Model boundary for threadline
//!
//! Streams chat completions from an OpenAI-compatible API, reassembles
//! tool calls from the chunk stream, executes them through the integration
//! hub, and loops until the model finishes its turn.

mod client;
mod error;
mod hub;
mod prompt;
#[cfg(test)]
mod stream_tests;
mod tools;
mod turn;
mod wire;

pub use client::{DEFAULT_MODEL, LlmClient};
pub use error::LlmError;
pub use hub::{HubClient, stock_registry};
pub use prompt::default_system_prompt;
pub use tools::{ToolDefinition, ToolError, ToolHandler, ToolRegistry};
pub use turn::{CompletedToolCall, ModelFinish, TurnEvent, TurnRequest, TurnStream};
