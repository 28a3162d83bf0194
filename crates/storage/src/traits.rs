use async_trait::async_trait;
use threadline_core::{Message, Session, TaskStatus};

use crate::error::StorageError;

/// Conversation session persistence. One row per user.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session for `user_id`. Absence is not an error.
    async fn get_session(&self, user_id: &str) -> Result<Option<Session>, StorageError>;

    /// Insert or replace the session row for `user_id` in one statement.
    /// `created_at` is preserved on replace; `updated_at` is bumped.
    async fn upsert_session(
        &self,
        user_id: &str,
        messages: &[Message],
        current_task: Option<&str>,
        task_status: Option<TaskStatus>,
    ) -> Result<(), StorageError>;

    /// Overwrite the task columns without touching messages. Both columns
    /// are always written; `None` clears. Returns `false` when no session
    /// row exists for `user_id`.
    async fn update_task(
        &self,
        user_id: &str,
        current_task: Option<&str>,
        task_status: Option<TaskStatus>,
    ) -> Result<bool, StorageError>;

    /// Delete the session. Returns `true` if a row was deleted.
    async fn delete_session(&self, user_id: &str) -> Result<bool, StorageError>;

    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> Result<(), StorageError>;
}
