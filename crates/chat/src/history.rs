//! Append-only chat history.
//!
//! History is for display only; retrieval never reads it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devbot_common::{DevbotError, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tokio::sync::RwLock;
use tracing::info;

/// One finished exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub user: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(
        user: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            question: question.into(),
            answer: answer.into(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: &HistoryRecord) -> Result<()>;

    /// The `limit` most recent records for `user`, oldest first.
    async fn recent(&self, user: &str, limit: usize) -> Result<Vec<HistoryRecord>>;
}

/// History kept in process memory.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<HashMap<String, Vec<HistoryRecord>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, record: &HistoryRecord) -> Result<()> {
        self.records
            .write()
            .await
            .entry(record.user.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn recent(&self, user: &str, limit: usize) -> Result<Vec<HistoryRecord>> {
        let records = self.records.read().await;
        let Some(list) = records.get(user) else {
            return Ok(Vec::new());
        };
        let start = list.len().saturating_sub(limit);
        Ok(list[start..].to_vec())
    }
}

/// History in the `chat_history` table.
#[derive(Clone)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    /// Connect and create the table if needed.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| DevbotError::History(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_history (
                id BIGSERIAL PRIMARY KEY,
                user_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(history_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS chat_history_user_idx ON chat_history (user_id, created_at)",
        )
        .execute(&pool)
        .await
        .map_err(history_err)?;

        info!("Chat history schema ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn append(&self, record: &HistoryRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_history (user_id, question, answer, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&record.user)
        .bind(&record.question)
        .bind(&record.answer)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(history_err)?;
        Ok(())
    }

    async fn recent(&self, user: &str, limit: usize) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, question, answer, created_at FROM (
                SELECT id, user_id, question, answer, created_at
                  FROM chat_history
                 WHERE user_id = $1
                 ORDER BY created_at DESC, id DESC
                 LIMIT $2
            ) latest
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(history_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(HistoryRecord {
                    user: row.try_get("user_id").map_err(history_err)?,
                    question: row.try_get("question").map_err(history_err)?,
                    answer: row.try_get("answer").map_err(history_err)?,
                    created_at: row.try_get("created_at").map_err(history_err)?,
                })
            })
            .collect()
    }
}

fn history_err(err: sqlx::Error) -> DevbotError {
    DevbotError::History(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recent_is_oldest_first_and_limited() {
        let store = InMemoryHistoryStore::new();
        for i in 0..5 {
            store
                .append(&HistoryRecord::new("ana", format!("q{i}"), format!("a{i}")))
                .await
                .unwrap();
        }
        store
            .append(&HistoryRecord::new("bo", "other", "user"))
            .await
            .unwrap();

        let recent = store.recent("ana", 3).await.unwrap();
        let questions: Vec<&str> = recent.iter().map(|r| r.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3", "q4"]);

        assert_eq!(store.recent("ana", 100).await.unwrap().len(), 5);
        assert!(store.recent("nobody", 10).await.unwrap().is_empty());
        assert!(store.recent("ana", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres at DATABASE_URL"]
    async fn postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PostgresHistoryStore::connect(&url, 2).await.unwrap();
        let user = format!("test-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());

        store
            .append(&HistoryRecord::new(&user, "first", "1"))
            .await
            .unwrap();
        store
            .append(&HistoryRecord::new(&user, "second", "2"))
            .await
            .unwrap();

        let recent = store.recent(&user, 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].question, "second");
    }
}
