use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::types::RunId;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Migration error: {message}")]
    Migration { message: String },

    #[error("In-memory journal lock poisoned: {message}")]
    LockPoisoned { message: String },
}

impl JournalError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum JournalEntryKind {
    Step,
    Event,
}

/// Memoized results of a run's steps and the event payloads it consumed.
///
/// Entries are write-once: recording a name that already has a value keeps
/// the first value.
#[async_trait]
pub trait StepJournal: Send + Sync {
    async fn load(
        &self,
        run_id: RunId,
        kind: JournalEntryKind,
        name: &str,
    ) -> Result<Option<Value>, JournalError>;

    async fn record(
        &self,
        run_id: RunId,
        kind: JournalEntryKind,
        name: &str,
        value: &Value,
    ) -> Result<(), JournalError>;

    async fn clear_run(&self, run_id: RunId) -> Result<(), JournalError>;
}

type EntryKey = (RunId, JournalEntryKind, String);

#[derive(Default)]
pub struct InMemoryStepJournal {
    entries: RwLock<HashMap<EntryKey, Value>>,
}

impl InMemoryStepJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepJournal for InMemoryStepJournal {
    async fn load(
        &self,
        run_id: RunId,
        kind: JournalEntryKind,
        name: &str,
    ) -> Result<Option<Value>, JournalError> {
        let entries = self.entries.read().map_err(|_| JournalError::LockPoisoned {
            message: "entries".to_string(),
        })?;
        Ok(entries.get(&(run_id, kind, name.to_string())).cloned())
    }

    async fn record(
        &self,
        run_id: RunId,
        kind: JournalEntryKind,
        name: &str,
        value: &Value,
    ) -> Result<(), JournalError> {
        let mut entries = self.entries.write().map_err(|_| JournalError::LockPoisoned {
            message: "entries".to_string(),
        })?;
        entries
            .entry((run_id, kind, name.to_string()))
            .or_insert_with(|| value.clone());
        Ok(())
    }

    async fn clear_run(&self, run_id: RunId) -> Result<(), JournalError> {
        let mut entries = self.entries.write().map_err(|_| JournalError::LockPoisoned {
            message: "entries".to_string(),
        })?;
        entries.retain(|(id, _, _), _| *id != run_id);
        Ok(())
    }
}

pub struct SqliteStepJournal {
    pool: SqlitePool,
}

impl SqliteStepJournal {
    /// Uses an existing pool, typically the one owned by the message store.
    pub async fn new(pool: SqlitePool) -> Result<Self, JournalError> {
        let journal = Self { pool };
        journal.run_migrations().await?;
        Ok(journal)
    }

    async fn run_migrations(&self) -> Result<(), JournalError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS step_journal (
                run_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (run_id, kind, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| JournalError::Migration {
            message: format!("Failed to create journal table: {e}"),
        })?;

        Ok(())
    }
}

#[async_trait]
impl StepJournal for SqliteStepJournal {
    async fn load(
        &self,
        run_id: RunId,
        kind: JournalEntryKind,
        name: &str,
    ) -> Result<Option<Value>, JournalError> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM step_journal WHERE run_id = ?1 AND kind = ?2 AND name = ?3",
        )
        .bind(run_id.to_string())
        .bind(kind.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| JournalError::database(format!("Failed to load journal entry: {e}")))?;

        value
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|e| {
                    JournalError::serialization(format!("Invalid journal entry: {e}"))
                })
            })
            .transpose()
    }

    async fn record(
        &self,
        run_id: RunId,
        kind: JournalEntryKind,
        name: &str,
        value: &Value,
    ) -> Result<(), JournalError> {
        let raw = serde_json::to_string(value).map_err(|e| {
            JournalError::serialization(format!("Failed to serialize journal entry: {e}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO step_journal (run_id, kind, name, value, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (run_id, kind, name) DO NOTHING
            "#,
        )
        .bind(run_id.to_string())
        .bind(kind.to_string())
        .bind(name)
        .bind(&raw)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| JournalError::database(format!("Failed to record journal entry: {e}")))?;

        Ok(())
    }

    async fn clear_run(&self, run_id: RunId) -> Result<(), JournalError> {
        sqlx::query("DELETE FROM step_journal WHERE run_id = ?1")
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| JournalError::database(format!("Failed to clear journal: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SqliteMessageStore;
    use serde_json::json;

    async fn exercise(journal: &dyn StepJournal) {
        let run_id = RunId::new();

        assert_eq!(
            journal
                .load(run_id, JournalEntryKind::Step, "relay-output-0")
                .await
                .unwrap(),
            None
        );

        journal
            .record(run_id, JournalEntryKind::Step, "relay-output-0", &json!(1))
            .await
            .unwrap();
        journal
            .record(run_id, JournalEntryKind::Step, "relay-output-0", &json!(2))
            .await
            .unwrap();
        assert_eq!(
            journal
                .load(run_id, JournalEntryKind::Step, "relay-output-0")
                .await
                .unwrap(),
            Some(json!(1))
        );

        // Steps and events share names without colliding.
        assert_eq!(
            journal
                .load(run_id, JournalEntryKind::Event, "relay-output-0")
                .await
                .unwrap(),
            None
        );

        journal.clear_run(run_id).await.unwrap();
        assert_eq!(
            journal
                .load(run_id, JournalEntryKind::Step, "relay-output-0")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_in_memory_journal_is_write_once() {
        exercise(&InMemoryStepJournal::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_journal_is_write_once() {
        let store = SqliteMessageStore::new_in_memory().await.unwrap();
        let journal = SqliteStepJournal::new(store.pool()).await.unwrap();
        exercise(&journal).await;
    }
}
