//! Request types (Deserialize)

use serde::Deserialize;
use threadline_core::{Message, TaskStatus};

/// Inbound chat turn: the client's view of the conversation plus the user
/// it belongs to.
#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Manual override of the session's task columns. Omitted fields clear.
#[derive(Debug, Deserialize)]
pub struct TaskUpdateRequest {
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default)]
    pub task_status: Option<TaskStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_parses_wire_shape() {
        let json = r#"{
            "messages": [{"id": "m1", "role": "user", "content": "hi"}],
            "userId": "user-1"
        }"#;
        let request: ChatTurnRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.user_id.as_deref(), Some("user-1"));
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn chat_request_tolerates_missing_fields() {
        let request: ChatTurnRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.user_id, None);
        assert!(request.messages.is_empty());
    }

    #[test]
    fn task_update_parses_status_values() {
        let json = r#"{"current_task": "Executing action", "task_status": "failed"}"#;
        let request: TaskUpdateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.current_task.as_deref(), Some("Executing action"));
        assert_eq!(request.task_status, Some(TaskStatus::Failed));
    }
}
