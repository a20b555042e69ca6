use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Row,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    },
};

use super::message_store::{MessageStore, MessageStoreError, RunSummary};
use crate::protocol::Message;
use crate::types::RunId;

pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub async fn new(path: &Path) -> Result<Self, MessageStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MessageStoreError::connection(format!("Failed to create directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| MessageStoreError::connection(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        Self::connect(options).await
    }

    pub async fn new_in_memory() -> Result<Self, MessageStoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| MessageStoreError::connection(format!("Invalid SQLite path: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, MessageStoreError> {
        // A single long-lived connection keeps `sqlite::memory:` databases alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                MessageStoreError::connection(format!("Failed to connect to SQLite: {e}"))
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// The underlying pool, shared with the step journal.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn run_migrations(&self) -> Result<(), MessageStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MessageStoreError::Migration {
            message: format!("Failed to create runs table: {e}"),
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS run_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                sequence_num INTEGER NOT NULL,
                message_id TEXT NOT NULL,
                message_type TEXT NOT NULL,
                message_data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE,
                UNIQUE(run_id, sequence_num)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MessageStoreError::Migration {
            message: format!("Failed to create messages table: {e}"),
        })?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_run_messages_run_seq
            ON run_messages(run_id, sequence_num)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MessageStoreError::Migration {
            message: format!("Failed to create index: {e}"),
        })?;

        Ok(())
    }

    fn decode_rows(
        rows: Vec<sqlx::sqlite::SqliteRow>,
    ) -> Result<Vec<(u64, Message)>, MessageStoreError> {
        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let seq: i64 = row.get("sequence_num");
            let data: String = row.get("message_data");
            let message: Message = serde_json::from_str(&data).map_err(|e| {
                MessageStoreError::serialization(format!("Invalid message data: {e}"))
            })?;
            messages.push((seq as u64, message));
        }
        Ok(messages)
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn create_run(&self, run_id: RunId) -> Result<(), MessageStoreError> {
        if self.run_exists(run_id).await? {
            return Err(MessageStoreError::RunAlreadyExists {
                run_id: run_id.to_string(),
            });
        }

        sqlx::query("INSERT INTO runs (id, created_at) VALUES (?1, ?2)")
            .bind(run_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| MessageStoreError::database(format!("Failed to create run: {e}")))?;

        Ok(())
    }

    async fn run_exists(&self, run_id: RunId) -> Result<bool, MessageStoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM runs WHERE id = ?1")
            .bind(run_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessageStoreError::database(format!("Failed to check run: {e}")))?;

        Ok(count > 0)
    }

    async fn append(&self, run_id: RunId, message: &Message) -> Result<u64, MessageStoreError> {
        if !self.run_exists(run_id).await? {
            return Err(MessageStoreError::run_not_found(run_id));
        }

        let run_id_str = run_id.to_string();
        let data = serde_json::to_string(message).map_err(|e| {
            MessageStoreError::serialization(format!("Failed to serialize message: {e}"))
        })?;

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_num), -1) + 1 FROM run_messages WHERE run_id = ?1",
        )
        .bind(&run_id_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MessageStoreError::database(format!("Failed to get next sequence: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO run_messages
                (run_id, sequence_num, message_id, message_type, message_data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&run_id_str)
        .bind(next_seq)
        .bind(message.id())
        .bind(message.kind().to_string())
        .bind(&data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MessageStoreError::database(format!("Failed to append message: {e}")))?;

        Ok(next_seq as u64)
    }

    async fn load_messages(&self, run_id: RunId) -> Result<Vec<(u64, Message)>, MessageStoreError> {
        if !self.run_exists(run_id).await? {
            return Err(MessageStoreError::run_not_found(run_id));
        }

        let rows = sqlx::query(
            r#"
            SELECT sequence_num, message_data
            FROM run_messages
            WHERE run_id = ?1
            ORDER BY sequence_num ASC
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MessageStoreError::database(format!("Failed to load messages: {e}")))?;

        Self::decode_rows(rows)
    }

    async fn delete_run(&self, run_id: RunId) -> Result<(), MessageStoreError> {
        if !self.run_exists(run_id).await? {
            return Err(MessageStoreError::run_not_found(run_id));
        }

        let run_id_str = run_id.to_string();

        sqlx::query("DELETE FROM run_messages WHERE run_id = ?1")
            .bind(&run_id_str)
            .execute(&self.pool)
            .await
            .map_err(|e| MessageStoreError::database(format!("Failed to delete messages: {e}")))?;

        sqlx::query("DELETE FROM runs WHERE id = ?1")
            .bind(&run_id_str)
            .execute(&self.pool)
            .await
            .map_err(|e| MessageStoreError::database(format!("Failed to delete run: {e}")))?;

        Ok(())
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>, MessageStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT r.id AS id, r.created_at AS created_at, COUNT(m.id) AS message_count
            FROM runs r
            LEFT JOIN run_messages m ON m.run_id = r.id
            GROUP BY r.id, r.created_at
            ORDER BY r.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MessageStoreError::database(format!("Failed to list runs: {e}")))?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let created_at: String = row.get("created_at");
            let message_count: i64 = row.get("message_count");

            let run_id = RunId::from_str(&id)
                .map_err(|e| MessageStoreError::serialization(format!("Invalid run ID: {e}")))?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| MessageStoreError::serialization(format!("Invalid timestamp: {e}")))?
                .with_timezone(&Utc);

            runs.push(RunSummary {
                run_id,
                created_at,
                message_count: message_count as u64,
            });
        }

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_store_append_and_load() {
        let store = SqliteMessageStore::new_in_memory().await.unwrap();
        let run_id = RunId::new();
        store.create_run(run_id).await.unwrap();

        let request = Message::input_request("relay-input-0", "Name?", None, None);
        let seq = store.append(run_id, &request).await.unwrap();
        assert_eq!(seq, 0);

        let messages = store.load_messages(run_id).await.unwrap();
        assert_eq!(messages, vec![(0, request)]);
    }

    #[tokio::test]
    async fn test_sqlite_store_sequence_numbers() {
        let store = SqliteMessageStore::new_in_memory().await.unwrap();
        let run_id = RunId::new();
        store.create_run(run_id).await.unwrap();

        for i in 0..5u64 {
            let seq = store
                .append(run_id, &Message::log(format!("relay-output-{i}"), "x"))
                .await
                .unwrap();
            assert_eq!(seq, i);
        }

        let seqs: Vec<u64> = store
            .load_messages(run_id)
            .await
            .unwrap()
            .into_iter()
            .map(|(seq, _)| seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_sqlite_store_rejects_unknown_run() {
        let store = SqliteMessageStore::new_in_memory().await.unwrap();
        let run_id = RunId::new();
        let result = store.append(run_id, &Message::log("a", "b")).await;
        assert!(matches!(result, Err(MessageStoreError::RunNotFound { .. })));
        assert!(matches!(
            store.load_messages(run_id).await,
            Err(MessageStoreError::RunNotFound { .. })
        ));
        assert!(matches!(
            store.delete_run(run_id).await,
            Err(MessageStoreError::RunNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_sqlite_store_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("runs.db");
        let run_id = RunId::new();

        {
            let store = SqliteMessageStore::new(&path).await.unwrap();
            store.create_run(run_id).await.unwrap();
            store
                .append(run_id, &Message::confirm_request("relay-confirm-0", "Ok?"))
                .await
                .unwrap();
            store.pool().close().await;
        }

        let store = SqliteMessageStore::new(&path).await.unwrap();
        let runs = store.list_runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, run_id);
        assert_eq!(runs[0].message_count, 1);

        store.delete_run(run_id).await.unwrap();
        assert!(!store.run_exists(run_id).await.unwrap());
    }
}
