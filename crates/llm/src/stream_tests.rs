//! End-to-end tests for the streaming turn loop against a mock API server.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use threadline_core::{MAX_TURN_STEPS, Message, Role};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::client::LlmClient;
use crate::error::LlmError;
use crate::tools::{ToolDefinition, ToolError, ToolHandler, ToolRegistry};
use crate::turn::{ModelFinish, TurnEvent, TurnRequest};

fn create_client(server: &MockServer) -> LlmClient {
    LlmClient::new("test-key".to_owned(), server.uri()).unwrap()
}

fn sse_body(chunks: &[String]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str("data: ");
        body.push_str(chunk);
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn text_chunk(content: &str) -> String {
    serde_json::json!({
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    })
    .to_string()
}

/// Tool call split across two chunks the way real streams deliver them:
/// id and name first, argument JSON afterwards.
fn tool_call_chunks(id: &str, name: &str, arguments: &str) -> Vec<String> {
    vec![
        serde_json::json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": id, "type": "function",
                 "function": {"name": name, "arguments": ""}}
            ]}, "finish_reason": null}]
        })
        .to_string(),
        serde_json::json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": arguments}}
            ]}, "finish_reason": null}]
        })
        .to_string(),
    ]
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

struct StaticTool(Value);

#[async_trait]
impl ToolHandler for StaticTool {
    async fn call(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(self.0.clone())
    }
}

fn single_tool_registry(name: &str, result: Value) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(
        ToolDefinition {
            name: name.to_owned(),
            description: "test tool".to_owned(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        },
        Arc::new(StaticTool(result)),
    );
    Arc::new(registry)
}

async fn collect_turn(
    client: &LlmClient,
    registry: Arc<ToolRegistry>,
    messages: Vec<Message>,
) -> Vec<Result<TurnEvent, LlmError>> {
    let request = TurnRequest { system: "test system".to_owned(), messages };
    let mut stream = client.run_turn(registry, request);
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

fn finish_of(events: &[Result<TurnEvent, LlmError>]) -> &ModelFinish {
    events
        .iter()
        .find_map(|event| match event {
            Ok(TurnEvent::Finish(finish)) => Some(finish),
            _ => None,
        })
        .expect("turn should finish")
}

fn text_of(events: &[Result<TurnEvent, LlmError>]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            Ok(TurnEvent::TextDelta { delta }) => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn streams_text_deltas_and_finishes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response(sse_body(&[
            text_chunk("Hel"),
            text_chunk("lo"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server);
    let events =
        collect_turn(&client, Arc::new(ToolRegistry::new()), vec![Message::new(
            "m1",
            Role::User,
            "hi",
        )])
        .await;

    assert!(matches!(events[0], Ok(TurnEvent::StepStarted { step: 0 })));
    assert_eq!(text_of(&events), "Hello");
    let finish = finish_of(&events);
    assert_eq!(finish.text, "Hello");
    assert!(finish.tool_calls.is_empty());
}

#[tokio::test]
async fn retries_transient_status_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response(sse_body(&[text_chunk("recovered")])))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server);
    let events =
        collect_turn(&client, Arc::new(ToolRegistry::new()), vec![Message::new(
            "m1",
            Role::User,
            "hi",
        )])
        .await;

    assert_eq!(finish_of(&events).text, "recovered");
}

#[tokio::test]
async fn non_transient_status_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server);
    let events =
        collect_turn(&client, Arc::new(ToolRegistry::new()), vec![Message::new(
            "m1",
            Role::User,
            "hi",
        )])
        .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        Err(LlmError::HttpStatus { code: 400, .. })
    ));
}

#[tokio::test]
async fn executes_tool_call_and_feeds_result_back() {
    let server = MockServer::start().await;
    // Second step: the request transcript carries the tool result.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains(r#""role":"tool""#))
        .respond_with(sse_response(sse_body(&[text_chunk("All set.")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response(sse_body(&tool_call_chunks(
            "call_1",
            "getAvailableConnections",
            "{}",
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server);
    let registry = single_tool_registry(
        "getAvailableConnections",
        serde_json::json!({"connections": ["github"]}),
    );
    let events = collect_turn(&client, registry, vec![Message::new(
        "m1",
        Role::User,
        "what can you reach?",
    )])
    .await;

    let started = events.iter().any(|event| {
        matches!(
            event,
            Ok(TurnEvent::ToolCallStarted { tool_name, .. })
                if tool_name == "getAvailableConnections"
        )
    });
    assert!(started);
    let completed_ok = events.iter().any(|event| {
        matches!(
            event,
            Ok(TurnEvent::ToolCallCompleted { failed: false, .. })
        )
    });
    assert!(completed_ok);

    let finish = finish_of(&events);
    assert_eq!(finish.text, "All set.");
    assert_eq!(finish.tool_calls.len(), 1);
    assert_eq!(finish.tool_calls[0].tool_call_id, "call_1");
    assert_eq!(
        finish.tool_calls[0].result,
        Some(serde_json::json!({"connections": ["github"]}))
    );
}

#[tokio::test]
async fn unknown_tool_reports_failure_and_continues() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains(r#""role":"tool""#))
        .respond_with(sse_response(sse_body(&[text_chunk(
            "That tool does not exist.",
        )])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response(sse_body(&tool_call_chunks(
            "call_1", "teleport", "{}",
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server);
    let registry =
        single_tool_registry("getAvailableConnections", serde_json::json!({}));
    let events = collect_turn(&client, registry, vec![Message::new(
        "m1",
        Role::User,
        "teleport me",
    )])
    .await;

    let failed = events.iter().any(|event| {
        matches!(
            event,
            Ok(TurnEvent::ToolCallCompleted { failed: true, tool_name, .. })
                if tool_name == "teleport"
        )
    });
    assert!(failed);

    let finish = finish_of(&events);
    assert_eq!(
        finish.tool_calls[0].result,
        Some(serde_json::json!({"error": "unknown tool: teleport"}))
    );
    assert_eq!(finish.text, "That tool does not exist.");
}

#[tokio::test]
async fn step_budget_leaves_final_calls_unexecuted() {
    let server = MockServer::start().await;
    // Every step asks for another tool call; the turn must stop on its own.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response(sse_body(&tool_call_chunks(
            "call_loop",
            "getAvailableConnections",
            "{}",
        ))))
        .expect(MAX_TURN_STEPS as u64)
        .mount(&server)
        .await;

    let client = create_client(&server);
    let registry =
        single_tool_registry("getAvailableConnections", serde_json::json!({}));
    let events =
        collect_turn(&client, registry, vec![Message::new("m1", Role::User, "loop")]).await;

    let finish = finish_of(&events);
    assert_eq!(finish.tool_calls.len(), MAX_TURN_STEPS);
    let executed = finish.tool_calls.iter().filter(|c| c.result.is_some()).count();
    assert_eq!(executed, MAX_TURN_STEPS - 1);
    assert!(finish.tool_calls.last().unwrap().result.is_none());
}
