//! Tool registration and dispatch for model-requested actions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::wire::{WireFunctionDefinition, WireTool};

/// Errors surfaced by tool execution. These become `{"error": ...}` tool
/// results for the model rather than aborting the turn.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{0}")]
    Failed(String),
}

/// A single executable tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Declaration the model sees: name, description, argument JSON schema.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Ordered collection of tools exposed to the model for a turn.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        self.tools.push(RegisteredTool { definition, handler });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().map(|t| &t.definition)
    }

    /// Wire-format tool declarations, or `None` when nothing is registered.
    pub(crate) fn wire_tools(&self) -> Option<Vec<WireTool>> {
        if self.tools.is_empty() {
            return None;
        }
        Some(
            self.tools
                .iter()
                .map(|t| WireTool {
                    kind: "function".to_owned(),
                    function: WireFunctionDefinition {
                        name: t.definition.name.clone(),
                        description: t.definition.description.clone(),
                        parameters: t.definition.parameters.clone(),
                    },
                })
                .collect(),
        )
    }

    /// Execute `name` with `args`.
    ///
    /// # Errors
    /// Returns `UnknownTool` for names the model invented, or whatever the
    /// handler reports.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let Some(tool) = self.tools.iter().find(|t| t.definition.name == name) else {
            return Err(ToolError::UnknownTool(name.to_owned()));
        };
        tool.handler.call(args).await
    }
}
