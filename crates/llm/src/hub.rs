//! Client for the action hub, the backend that executes real-world
//! actions (sending messages, creating issues) on connected platforms.
//!
//! The hub is exposed to the model as a fixed set of tools; see
//! [`stock_registry`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ToolDefinition, ToolError, ToolHandler, ToolRegistry};

/// HTTP client for the action hub API. Authenticates every request with
/// the shared hub secret.
#[derive(Clone)]
pub struct HubClient {
    client: reqwest::Client,
    base_url: String,
    secret: String,
}

impl fmt::Debug for HubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubClient")
            .field("base_url", &self.base_url)
            .field("secret", &"***")
            .finish_non_exhaustive()
    }
}

impl HubClient {
    pub fn new(base_url: &str, secret: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            secret: secret.to_owned(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ToolError> {
        let response = request
            .header("x-hub-secret", &self.secret)
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("hub request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Failed(format!("hub response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(ToolError::Failed(format!(
                "hub returned {status}: {}",
                crate::client::truncate(&body, 200)
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| ToolError::Failed(format!("hub returned invalid JSON: {e}")))
    }

    pub async fn available_connections(&self) -> Result<Value, ToolError> {
        self.send(self.client.get(format!("{}/v1/connections", self.base_url)))
            .await
    }

    pub async fn available_actions(&self, platform: &str) -> Result<Value, ToolError> {
        self.send(
            self.client
                .get(format!("{}/v1/actions", self.base_url))
                .query(&[("platform", platform)]),
        )
        .await
    }

    pub async fn action_knowledge(&self, action_id: &str) -> Result<Value, ToolError> {
        self.send(
            self.client
                .get(format!("{}/v1/actions/{action_id}/knowledge", self.base_url)),
        )
        .await
    }

    pub async fn execute_action(&self, args: &Value) -> Result<Value, ToolError> {
        self.send(
            self.client
                .post(format!("{}/v1/execute", self.base_url))
                .json(args),
        )
        .await
    }

    pub async fn github_connect_link(&self) -> Result<Value, ToolError> {
        self.send(self.client.post(format!("{}/v1/connect/github", self.base_url)))
            .await
    }
}

#[derive(Debug, Clone, Copy)]
enum HubToolKind {
    Connections,
    Actions,
    ActionKnowledge,
    Execute,
    ConnectGithub,
}

struct HubTool {
    hub: Arc<HubClient>,
    kind: HubToolKind,
}

fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgs(format!("missing required field: {field}")))
}

#[async_trait]
impl ToolHandler for HubTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        match self.kind {
            HubToolKind::Connections => self.hub.available_connections().await,
            HubToolKind::Actions => {
                let platform = required_str(&args, "platform")?;
                self.hub.available_actions(platform).await
            },
            HubToolKind::ActionKnowledge => {
                let action_id = required_str(&args, "actionId")?;
                self.hub.action_knowledge(action_id).await
            },
            HubToolKind::Execute => self.hub.execute_action(&args).await,
            HubToolKind::ConnectGithub => self.hub.github_connect_link().await,
        }
    }
}

/// The standard tool set backed by the action hub.
#[must_use]
pub fn stock_registry(hub: Arc<HubClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(
        ToolDefinition {
            name: "getAvailableConnections".to_owned(),
            description: "List the platforms the user has connected and can act on.".to_owned(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
            }),
        },
        Arc::new(HubTool { hub: Arc::clone(&hub), kind: HubToolKind::Connections }),
    );
    registry.register(
        ToolDefinition {
            name: "getAvailableActions".to_owned(),
            description: "List the actions supported on a connected platform.".to_owned(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "platform": {
                        "type": "string",
                        "description": "Platform identifier, e.g. \"github\".",
                    },
                },
                "required": ["platform"],
            }),
        },
        Arc::new(HubTool { hub: Arc::clone(&hub), kind: HubToolKind::Actions }),
    );
    registry.register(
        ToolDefinition {
            name: "getActionKnowledge".to_owned(),
            description: "Fetch the parameter schema and usage notes for one action.".to_owned(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "actionId": {
                        "type": "string",
                        "description": "Identifier returned by getAvailableActions.",
                    },
                },
                "required": ["actionId"],
            }),
        },
        Arc::new(HubTool { hub: Arc::clone(&hub), kind: HubToolKind::ActionKnowledge }),
    );
    registry.register(
        ToolDefinition {
            name: "execute".to_owned(),
            description: "Execute an action with its parameters. Call getActionKnowledge first."
                .to_owned(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "actionId": {
                        "type": "string",
                        "description": "Identifier of the action to run.",
                    },
                    "parameters": {
                        "type": "object",
                        "description": "Action parameters matching the knowledge schema.",
                    },
                },
                "required": ["actionId"],
            }),
        },
        Arc::new(HubTool { hub: Arc::clone(&hub), kind: HubToolKind::Execute }),
    );
    registry.register(
        ToolDefinition {
            name: "connectGithub".to_owned(),
            description: "Create a link the user can open to connect their GitHub account."
                .to_owned(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
            }),
        },
        Arc::new(HubTool { hub, kind: HubToolKind::ConnectGithub }),
    );
    registry
}
