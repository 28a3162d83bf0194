//! Multi-step model turn.
//!
//! One turn streams deltas from the model, executes any tool calls it
//! requests, feeds the results back, and repeats until the model answers
//! without tools or the step budget runs out.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use threadline_core::{MAX_TURN_STEPS, Message, Role};

use crate::client::LlmClient;
use crate::error::LlmError;
use crate::tools::ToolRegistry;
use crate::wire::{
    ChatCompletionRequest, ToolCallFragment, WireFunctionCall, WireMessage, WireToolCall,
};

/// Events emitted while a turn runs. Serialized verbatim onto the SSE
/// response stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    StepStarted { step: usize },
    TextDelta { delta: String },
    ToolCallStarted { tool_call_id: String, tool_name: String },
    ToolCallCompleted { tool_call_id: String, tool_name: String, failed: bool },
    Finish(ModelFinish),
}

/// Terminal payload for one turn: the accumulated assistant text plus
/// every tool call the model made, with results where execution happened.
#[derive(Debug, Clone, Serialize)]
pub struct ModelFinish {
    pub text: String,
    pub tool_calls: Vec<CompletedToolCall>,
}

/// A tool call as reported at turn end. `result` is `None` only when the
/// step budget ran out before the call could be executed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Input for one conversation turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub system: String,
    pub messages: Vec<Message>,
}

pub type TurnStream = Pin<Box<dyn Stream<Item = Result<TurnEvent, LlmError>> + Send>>;

impl LlmClient {
    /// Drive a full multi-step turn against the model.
    ///
    /// The stream is lazy: nothing is sent until it is polled, and dropping
    /// it abandons the turn. Tool calls are executed through `registry`
    /// between steps; calls still pending when [`MAX_TURN_STEPS`] is
    /// reached are reported in the finish event without a result.
    #[must_use]
    pub fn run_turn(&self, registry: Arc<ToolRegistry>, request: TurnRequest) -> TurnStream {
        let client = self.clone();
        Box::pin(async_stream::stream! {
            let mut transcript = build_transcript(&request.system, &request.messages);
            let tools = registry.wire_tools();
            let mut text = String::new();
            let mut completed: Vec<CompletedToolCall> = Vec::new();

            for step in 0..MAX_TURN_STEPS {
                let chat_request = ChatCompletionRequest {
                    model: client.model().to_owned(),
                    messages: transcript.clone(),
                    tools: tools.clone(),
                    stream: true,
                };
                let mut chunks = match client.open_stream(&chat_request).await {
                    Ok(s) => s,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                yield Ok(TurnEvent::StepStarted { step });

                let mut assembler = ToolCallAssembler::default();
                while let Some(chunk) = chunks.next().await {
                    let chunk = match chunk {
                        Ok(c) => c,
                        Err(e) => {
                            yield Err(e);
                            return;
                        },
                    };
                    let Some(choice) = chunk.choices.into_iter().next() else {
                        continue;
                    };
                    if let Some(delta) = choice.delta.content {
                        if !delta.is_empty() {
                            text.push_str(&delta);
                            yield Ok(TurnEvent::TextDelta { delta });
                        }
                    }
                    if let Some(fragments) = choice.delta.tool_calls {
                        assembler.absorb(fragments);
                    }
                }

                let requested = assembler.finish();
                if requested.is_empty() {
                    break;
                }

                transcript.push(assistant_tool_call_message(&requested));
                let out_of_steps = step + 1 >= MAX_TURN_STEPS;
                for call in requested {
                    let args = call.parsed_args();
                    if out_of_steps {
                        // Reported without a result; readers see it as still pending.
                        completed.push(CompletedToolCall {
                            tool_call_id: call.id,
                            tool_name: call.name,
                            args,
                            result: None,
                        });
                        continue;
                    }
                    yield Ok(TurnEvent::ToolCallStarted {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                    });
                    let (result, failed) = match registry.execute(&call.name, args.clone()).await {
                        Ok(value) => (value, false),
                        Err(e) => (serde_json::json!({"error": e.to_string()}), true),
                    };
                    transcript.push(tool_result_message(&call.id, &result));
                    yield Ok(TurnEvent::ToolCallCompleted {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        failed,
                    });
                    completed.push(CompletedToolCall {
                        tool_call_id: call.id,
                        tool_name: call.name,
                        args,
                        result: Some(result),
                    });
                }
                if out_of_steps {
                    tracing::warn!(
                        steps = MAX_TURN_STEPS,
                        "turn step budget exhausted with tool calls pending"
                    );
                    break;
                }
            }

            yield Ok(TurnEvent::Finish(ModelFinish { text, tool_calls: completed }));
        })
    }
}

const fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

/// Replay conversation history in wire form: the system prompt first, then
/// each message. Assistant messages with recorded tool invocations expand
/// into the assistant tool-call message followed by one tool message per
/// available result, so the model sees the same transcript it produced.
fn build_transcript(system: &str, messages: &[Message]) -> Vec<WireMessage> {
    let mut transcript = Vec::with_capacity(messages.len() + 1);
    transcript.push(WireMessage {
        role: "system".to_owned(),
        content: Some(system.to_owned()),
        tool_calls: None,
        tool_call_id: None,
    });
    for message in messages {
        match message.role {
            Role::Assistant if !message.tool_invocations.is_empty() => {
                let tool_calls = message
                    .tool_invocations
                    .iter()
                    .map(|invocation| WireToolCall {
                        id: invocation.tool_call_id.clone(),
                        kind: "function".to_owned(),
                        function: WireFunctionCall {
                            name: invocation.tool_name.clone(),
                            arguments: invocation.args.to_string(),
                        },
                    })
                    .collect();
                transcript.push(WireMessage {
                    role: "assistant".to_owned(),
                    content: Some(message.content.clone()),
                    tool_calls: Some(tool_calls),
                    tool_call_id: None,
                });
                for invocation in &message.tool_invocations {
                    if let Some(result) = &invocation.result {
                        transcript.push(WireMessage {
                            role: "tool".to_owned(),
                            content: Some(result.to_string()),
                            tool_calls: None,
                            tool_call_id: Some(invocation.tool_call_id.clone()),
                        });
                    }
                }
            },
            role => {
                transcript.push(WireMessage {
                    role: wire_role(role).to_owned(),
                    content: Some(message.content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                });
            },
        }
    }
    transcript
}

fn assistant_tool_call_message(requested: &[RequestedToolCall]) -> WireMessage {
    let tool_calls = requested
        .iter()
        .map(|call| WireToolCall {
            id: call.id.clone(),
            kind: "function".to_owned(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        })
        .collect();
    WireMessage {
        role: "assistant".to_owned(),
        content: None,
        tool_calls: Some(tool_calls),
        tool_call_id: None,
    }
}

fn tool_result_message(tool_call_id: &str, result: &Value) -> WireMessage {
    WireMessage {
        role: "tool".to_owned(),
        content: Some(result.to_string()),
        tool_calls: None,
        tool_call_id: Some(tool_call_id.to_owned()),
    }
}

/// Reassembles tool calls from streamed fragments, keyed by `index`.
#[derive(Debug, Default)]
struct ToolCallAssembler {
    calls: Vec<PendingToolCall>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAssembler {
    fn absorb(&mut self, fragments: Vec<ToolCallFragment>) {
        for fragment in fragments {
            if fragment.index >= self.calls.len() {
                self.calls.resize_with(fragment.index + 1, PendingToolCall::default);
            }
            let call = &mut self.calls[fragment.index];
            if let Some(id) = fragment.id {
                call.id = id;
            }
            if let Some(function) = fragment.function {
                if let Some(name) = function.name {
                    call.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    call.arguments.push_str(&arguments);
                }
            }
        }
    }

    /// Fragments that never received a name are dropped; they cannot be
    /// dispatched or replayed.
    fn finish(self) -> Vec<RequestedToolCall> {
        self.calls
            .into_iter()
            .filter(|call| !call.name.is_empty())
            .map(|call| RequestedToolCall {
                id: call.id,
                name: call.name,
                arguments: call.arguments,
            })
            .collect()
    }
}

#[derive(Debug)]
struct RequestedToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl RequestedToolCall {
    /// Malformed argument JSON becomes `null`; the tool still runs and can
    /// reject it.
    fn parsed_args(&self) -> Value {
        serde_json::from_str(&self.arguments).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::FunctionFragment;
    use threadline_core::{InvocationState, ToolInvocation};

    fn fragment(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> ToolCallFragment {
        ToolCallFragment {
            index,
            id: id.map(str::to_owned),
            function: Some(FunctionFragment {
                name: name.map(str::to_owned),
                arguments: arguments.map(str::to_owned),
            }),
        }
    }

    #[test]
    fn assembler_joins_split_arguments() {
        let mut assembler = ToolCallAssembler::default();
        assembler.absorb(vec![fragment(0, Some("call_1"), Some("execute"), Some("{\"action"))]);
        assembler.absorb(vec![fragment(0, None, None, Some("Id\":\"a1\"}"))]);

        let calls = assembler.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "execute");
        assert_eq!(calls[0].parsed_args(), serde_json::json!({"actionId": "a1"}));
    }

    #[test]
    fn assembler_tracks_parallel_calls_by_index() {
        let mut assembler = ToolCallAssembler::default();
        assembler.absorb(vec![
            fragment(0, Some("call_a"), Some("getAvailableConnections"), Some("{}")),
            fragment(1, Some("call_b"), Some("getAvailableActions"), Some("{\"platform\":")),
        ]);
        assembler.absorb(vec![fragment(1, None, None, Some("\"github\"}"))]);

        let calls = assembler.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "getAvailableConnections");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(
            calls[1].parsed_args(),
            serde_json::json!({"platform": "github"})
        );
    }

    #[test]
    fn malformed_arguments_parse_as_null() {
        let call = RequestedToolCall {
            id: "call_1".to_owned(),
            name: "execute".to_owned(),
            arguments: "{not json".to_owned(),
        };
        assert_eq!(call.parsed_args(), Value::Null);
    }

    #[test]
    fn transcript_replays_tool_results_after_assistant() {
        let mut assistant = Message::new("a1", Role::Assistant, "done");
        assistant.tool_invocations.push(ToolInvocation {
            tool_call_id: "call_1".to_owned(),
            tool_name: "execute".to_owned(),
            args: serde_json::json!({"actionId": "a1"}),
            state: InvocationState::Result,
            result: Some(serde_json::json!({"success": true})),
        });
        let messages =
            vec![Message::new("m1", Role::User, "run it"), assistant];

        let transcript = build_transcript("be helpful", &messages);
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[0].role, "system");
        assert_eq!(transcript[1].role, "user");
        assert_eq!(transcript[2].role, "assistant");
        assert_eq!(transcript[2].tool_calls.as_ref().unwrap().len(), 1);
        assert_eq!(transcript[3].role, "tool");
        assert_eq!(transcript[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(transcript[3].content.as_deref(), Some("{\"success\":true}"));
    }

    #[test]
    fn finish_event_serializes_with_type_tag() {
        let event = TurnEvent::Finish(ModelFinish {
            text: "done".to_owned(),
            tool_calls: vec![CompletedToolCall {
                tool_call_id: "call_1".to_owned(),
                tool_name: "execute".to_owned(),
                args: serde_json::json!({}),
                result: Some(serde_json::json!({"ok": true})),
            }],
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "finish");
        assert_eq!(json["text"], "done");
        assert_eq!(json["tool_calls"][0]["toolCallId"], "call_1");

        let delta = TurnEvent::TextDelta { delta: "hi".to_owned() };
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json["type"], "text_delta");
        assert_eq!(json["delta"], "hi");
    }
}
