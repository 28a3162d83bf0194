//! Turn orchestration: load, merge, model call, persist.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use threadline_core::{InvocationState, Message, Role, ToolInvocation};
use threadline_llm::{LlmClient, ModelFinish, ToolRegistry, TurnEvent, TurnRequest, TurnStream};
use threadline_storage::{SessionStore, StorageBackend};

use crate::merge::merge_history;
use crate::task::derive_task;

/// Turn-level configuration, fixed at startup.
pub struct ReconcilerConfig {
    pub system_prompt: String,
    /// Skip merging and take the client's history as authoritative. Weaker
    /// than the default merge mode: two devices writing concurrently can
    /// silently drop each other's messages.
    pub trust_client: bool,
}

/// Orchestrates one chat turn end to end.
///
/// Loads the persisted session, merges it with the client's history, runs
/// the model turn, and schedules persistence when the model finishes. The
/// persistence side-effect runs detached from the response stream so a
/// storage failure can never alter what the client already received.
pub struct SessionReconciler {
    storage: Arc<StorageBackend>,
    llm: LlmClient,
    registry: Arc<ToolRegistry>,
    config: ReconcilerConfig,
}

/// Process-wide suffix keeping assistant ids unique under rapid turns that
/// land on the same millisecond.
static ASSISTANT_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_assistant_id() -> String {
    let seq = ASSISTANT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("assistant-{}-{seq}", chrono::Utc::now().timestamp_millis())
}

impl SessionReconciler {
    #[must_use]
    pub fn new(
        storage: Arc<StorageBackend>,
        llm: LlmClient,
        registry: Arc<ToolRegistry>,
        config: ReconcilerConfig,
    ) -> Self {
        Self { storage, llm, registry, config }
    }

    /// Run one chat turn for `user_id`, streaming turn events as the model
    /// produces them.
    ///
    /// The stream is lazy. Dropping it before the finish event aborts the
    /// turn without persisting anything; once the finish event has been
    /// produced, persistence proceeds even if the client disconnects.
    #[must_use]
    pub fn begin_turn(&self, user_id: &str, client_messages: Vec<Message>) -> TurnStream {
        let storage = Arc::clone(&self.storage);
        let llm = self.llm.clone();
        let registry = Arc::clone(&self.registry);
        let system = self.config.system_prompt.clone();
        let trust_client = self.config.trust_client;
        let user_id = user_id.to_owned();

        Box::pin(async_stream::stream! {
            let turn_id = uuid::Uuid::new_v4();
            let existing = match storage.get_session(&user_id).await {
                Ok(session) => session,
                Err(e) => {
                    // Degrade to a fresh conversation rather than failing the turn.
                    tracing::warn!(
                        user_id = %user_id,
                        %turn_id,
                        error = %e,
                        "session load failed, starting fresh"
                    );
                    None
                },
            };
            let has_existing_session = existing.is_some();
            let merged = if trust_client {
                client_messages
            } else {
                merge_history(
                    existing.as_ref().map(|s| s.messages.as_slice()),
                    &client_messages,
                )
            };
            tracing::info!(
                user_id = %user_id,
                %turn_id,
                message_count = merged.len(),
                has_existing_session,
                "chat turn started"
            );

            let request = TurnRequest { system, messages: merged.clone() };
            let mut turn = llm.run_turn(registry, request);
            while let Some(event) = turn.next().await {
                match event {
                    Ok(TurnEvent::Finish(finish)) => {
                        let storage = Arc::clone(&storage);
                        let save_user = user_id.clone();
                        let save_finish = finish.clone();
                        tokio::spawn(async move {
                            Self::finish_turn(storage, save_user, turn_id, merged, save_finish)
                                .await;
                        });
                        yield Ok(TurnEvent::Finish(finish));
                        return;
                    },
                    other => yield other,
                }
            }
        })
    }

    /// Persist the outcome of a finished turn: append the assistant message
    /// to the merged history, derive the task, and upsert the session row.
    ///
    /// Runs detached from the response stream. Failures are logged and
    /// swallowed; they must never reach the client.
    async fn finish_turn(
        storage: Arc<StorageBackend>,
        user_id: String,
        turn_id: uuid::Uuid,
        mut history: Vec<Message>,
        finish: ModelFinish,
    ) {
        let mut invocations: Vec<ToolInvocation> = finish
            .tool_calls
            .iter()
            .map(|call| ToolInvocation {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                args: call.args.clone(),
                // A call the turn never executed is still in flight.
                state: if call.result.is_some() {
                    InvocationState::Result
                } else {
                    InvocationState::Call
                },
                result: call.result.clone(),
            })
            .collect();

        let task_info = derive_task(&invocations);

        // Persisted invocations are settled records, not live state.
        for invocation in &mut invocations {
            invocation.state = InvocationState::Result;
        }

        let mut assistant = Message::new(next_assistant_id(), Role::Assistant, finish.text);
        assistant.tool_invocations = invocations;
        history.push(assistant);

        let current_task = task_info.as_ref().map(|info| info.task.as_str());
        let task_status = task_info.as_ref().map(|info| info.status);
        match storage.upsert_session(&user_id, &history, current_task, task_status).await {
            Ok(()) => {
                tracing::info!(
                    user_id = %user_id,
                    %turn_id,
                    message_count = history.len(),
                    current_task = current_task.unwrap_or("none"),
                    "session saved"
                );
            },
            Err(e) => {
                tracing::error!(user_id = %user_id, %turn_id, error = %e, "session save failed");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::TaskStatus;
    use threadline_llm::CompletedToolCall;

    fn memory_backend() -> Arc<StorageBackend> {
        Arc::new(StorageBackend::new_memory())
    }

    fn completed_call(result: Option<serde_json::Value>) -> CompletedToolCall {
        CompletedToolCall {
            tool_call_id: "call_1".to_owned(),
            tool_name: "execute".to_owned(),
            args: serde_json::json!({"actionId": "a1"}),
            result,
        }
    }

    #[test]
    fn assistant_ids_are_unique_under_rapid_calls() {
        let a = next_assistant_id();
        let b = next_assistant_id();
        assert!(a.starts_with("assistant-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn finish_turn_appends_assistant_and_persists() {
        let storage = memory_backend();
        let history = vec![Message::new("m1", Role::User, "run it")];
        let finish = ModelFinish {
            text: "done".to_owned(),
            tool_calls: vec![completed_call(Some(serde_json::json!({"success": true})))],
        };

        SessionReconciler::finish_turn(
            Arc::clone(&storage),
            "user-1".to_owned(),
            uuid::Uuid::new_v4(),
            history,
            finish,
        )
        .await;

        let session = storage.get_session("user-1").await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 2);
        let assistant = &session.messages[1];
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.content, "done");
        assert_eq!(assistant.tool_invocations.len(), 1);
        assert_eq!(assistant.tool_invocations[0].state, InvocationState::Result);
        assert_eq!(session.current_task.as_deref(), Some("Executing action"));
        assert_eq!(session.task_status, Some(TaskStatus::Completed));
    }

    #[tokio::test]
    async fn finish_turn_without_tool_calls_clears_task() {
        let storage = memory_backend();
        storage
            .upsert_session(
                "user-2",
                &[Message::new("m1", Role::User, "hi")],
                Some("Executing action"),
                Some(TaskStatus::InProgress),
            )
            .await
            .unwrap();

        let finish = ModelFinish { text: "just chatting".to_owned(), tool_calls: vec![] };
        SessionReconciler::finish_turn(
            Arc::clone(&storage),
            "user-2".to_owned(),
            uuid::Uuid::new_v4(),
            vec![Message::new("m1", Role::User, "hi")],
            finish,
        )
        .await;

        let session = storage.get_session("user-2").await.unwrap().unwrap();
        assert_eq!(session.current_task, None);
        assert_eq!(session.task_status, None);
    }

    #[tokio::test]
    async fn unexecuted_call_derives_in_progress_but_persists_as_settled() {
        let storage = memory_backend();
        let finish = ModelFinish { text: String::new(), tool_calls: vec![completed_call(None)] };

        SessionReconciler::finish_turn(
            Arc::clone(&storage),
            "user-3".to_owned(),
            uuid::Uuid::new_v4(),
            vec![Message::new("m1", Role::User, "go")],
            finish,
        )
        .await;

        let session = storage.get_session("user-3").await.unwrap().unwrap();
        assert_eq!(session.task_status, Some(TaskStatus::InProgress));
        let invocation = &session.messages[1].tool_invocations[0];
        assert_eq!(invocation.state, InvocationState::Result);
        assert_eq!(invocation.result, None);
    }

    #[tokio::test]
    async fn failed_execution_marks_task_failed() {
        let storage = memory_backend();
        let finish = ModelFinish {
            text: "that did not work".to_owned(),
            tool_calls: vec![completed_call(Some(serde_json::json!({
                "success": false,
                "error": "connection expired"
            })))],
        };

        SessionReconciler::finish_turn(
            Arc::clone(&storage),
            "user-4".to_owned(),
            uuid::Uuid::new_v4(),
            vec![Message::new("m1", Role::User, "go")],
            finish,
        )
        .await;

        let session = storage.get_session("user-4").await.unwrap().unwrap();
        assert_eq!(session.current_task.as_deref(), Some("Executing action"));
        assert_eq!(session.task_status, Some(TaskStatus::Failed));
    }
}
