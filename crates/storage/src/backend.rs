//! Unified storage backend with enum dispatch.

use async_trait::async_trait;
use threadline_core::{Message, Session, TaskStatus};

use crate::error::StorageError;
use crate::memory::MemoryStorage;
use crate::pg::PgStorage;
use crate::traits::SessionStore;

macro_rules! dispatch {
    ($self:expr, $method:ident ( $($arg:expr),* $(,)? )) => {
        match $self {
            StorageBackend::Postgres(s) => s.$method($($arg),*).await,
            StorageBackend::Memory(s) => s.$method($($arg),*).await,
        }
    };
}

#[derive(Clone, Debug)]
pub enum StorageBackend {
    Postgres(PgStorage),
    Memory(MemoryStorage),
}

impl StorageBackend {
    pub async fn new_postgres(database_url: &str) -> Result<Self, StorageError> {
        Ok(Self::Postgres(PgStorage::new(database_url).await?))
    }

    #[must_use]
    pub fn new_memory() -> Self {
        Self::Memory(MemoryStorage::new())
    }
}

#[async_trait]
impl SessionStore for StorageBackend {
    async fn get_session(&self, user_id: &str) -> Result<Option<Session>, StorageError> {
        dispatch!(self, get_session(user_id))
    }

    async fn upsert_session(
        &self,
        user_id: &str,
        messages: &[Message],
        current_task: Option<&str>,
        task_status: Option<TaskStatus>,
    ) -> Result<(), StorageError> {
        dispatch!(self, upsert_session(user_id, messages, current_task, task_status))
    }

    async fn update_task(
        &self,
        user_id: &str,
        current_task: Option<&str>,
        task_status: Option<TaskStatus>,
    ) -> Result<bool, StorageError> {
        dispatch!(self, update_task(user_id, current_task, task_status))
    }

    async fn delete_session(&self, user_id: &str) -> Result<bool, StorageError> {
        dispatch!(self, delete_session(user_id))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        dispatch!(self, ping())
    }
}
