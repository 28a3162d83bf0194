//! PostgreSQL storage backend using sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use threadline_core::{
    Message, PG_POOL_ACQUIRE_TIMEOUT_SECS, PG_POOL_IDLE_TIMEOUT_SECS, PG_POOL_MAX_CONNECTIONS,
    Session, TaskStatus,
};

use crate::error::StorageError;
use crate::migrations::run_pg_migrations;
use crate::traits::SessionStore;

#[derive(Clone, Debug)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(PG_POOL_MAX_CONNECTIONS)
            .acquire_timeout(std::time::Duration::from_secs(PG_POOL_ACQUIRE_TIMEOUT_SECS))
            .idle_timeout(std::time::Duration::from_secs(PG_POOL_IDLE_TIMEOUT_SECS))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;
        run_pg_migrations(&pool).await.map_err(|e| StorageError::Migration(e.to_string()))?;
        tracing::info!("PgStorage initialized");
        Ok(Self { pool })
    }
}

pub(crate) const SESSION_COLUMNS: &str =
    "user_id, messages, current_task, task_status, created_at, updated_at";

/// Parse `TaskStatus` from an optional PostgreSQL text column.
fn parse_pg_task_status(s: Option<&str>) -> Option<TaskStatus> {
    let s = s?;
    s.parse().map_or_else(
        |_| {
            tracing::warn!(invalid_status = %s, "corrupt task_status in DB, dropping");
            None
        },
        Some,
    )
}

fn row_to_session(row: &sqlx::postgres::PgRow) -> Result<Session, StorageError> {
    let user_id: String = row.try_get("user_id")?;
    let messages_json: serde_json::Value = row.try_get("messages")?;
    let messages: Vec<Message> =
        serde_json::from_value(messages_json).map_err(|e| StorageError::DataCorruption {
            context: format!("messages for user {user_id}"),
            source: Box::new(e),
        })?;
    let task_status =
        parse_pg_task_status(row.try_get::<Option<String>, _>("task_status")?.as_deref());
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
    Ok(Session::new(
        user_id,
        messages,
        row.try_get("current_task")?,
        task_status,
        created_at,
        updated_at,
    ))
}

#[async_trait]
impl SessionStore for PgStorage {
    async fn get_session(&self, user_id: &str) -> Result<Option<Session>, StorageError> {
        let row =
            sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE user_id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn upsert_session(
        &self,
        user_id: &str,
        messages: &[Message],
        current_task: Option<&str>,
        task_status: Option<TaskStatus>,
    ) -> Result<(), StorageError> {
        let messages_json = serde_json::to_value(messages)?;
        sqlx::query(
            "INSERT INTO chat_sessions (user_id, messages, current_task, task_status)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id) DO UPDATE SET
               messages = EXCLUDED.messages,
               current_task = EXCLUDED.current_task,
               task_status = EXCLUDED.task_status,
               updated_at = NOW()",
        )
        .bind(user_id)
        .bind(messages_json)
        .bind(current_task)
        .bind(task_status.map(TaskStatus::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_task(
        &self,
        user_id: &str,
        current_task: Option<&str>,
        task_status: Option<TaskStatus>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET current_task = $1, task_status = $2, updated_at = NOW()
             WHERE user_id = $3",
        )
        .bind(current_task)
        .bind(task_status.map(TaskStatus::as_str))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, user_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
