//! In-memory storage backend.
//!
//! Used by tests and by development runs without `DATABASE_URL`. Sessions
//! do not survive process restart.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use threadline_core::{Message, Session, TaskStatus};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::traits::SessionStore;

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStorage {
    async fn get_session(&self, user_id: &str) -> Result<Option<Session>, StorageError> {
        Ok(self.sessions.read().await.get(user_id).cloned())
    }

    async fn upsert_session(
        &self,
        user_id: &str,
        messages: &[Message],
        current_task: Option<&str>,
        task_status: Option<TaskStatus>,
    ) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        match sessions.entry(user_id.to_owned()) {
            Entry::Occupied(mut entry) => {
                let session = entry.get_mut();
                session.messages = messages.to_vec();
                session.current_task = current_task.map(str::to_owned);
                session.task_status = task_status;
                session.updated_at = now;
            },
            Entry::Vacant(entry) => {
                entry.insert(Session::new(
                    user_id.to_owned(),
                    messages.to_vec(),
                    current_task.map(str::to_owned),
                    task_status,
                    now,
                    now,
                ));
            },
        }
        Ok(())
    }

    async fn update_task(
        &self,
        user_id: &str,
        current_task: Option<&str>,
        task_status: Option<TaskStatus>,
    ) -> Result<bool, StorageError> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(user_id) else {
            return Ok(false);
        };
        session.current_task = current_task.map(str::to_owned);
        session.task_status = task_status;
        session.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_session(&self, user_id: &str) -> Result<bool, StorageError> {
        Ok(self.sessions.write().await.remove(user_id).is_some())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
