use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::Message;
use crate::types::RunId;

#[derive(Debug, Error)]
pub enum MessageStoreError {
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Run already exists: {run_id}")]
    RunAlreadyExists { run_id: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Migration error: {message}")]
    Migration { message: String },

    #[error("In-memory store lock poisoned: {message}")]
    LockPoisoned { message: String },
}

impl MessageStoreError {
    pub fn run_not_found(run_id: RunId) -> Self {
        Self::RunNotFound {
            run_id: run_id.to_string(),
        }
    }

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

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn lock_poisoned(message: impl Into<String>) -> Self {
        Self::LockPoisoned {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub message_count: u64,
}

/// Durable, append-only storage of each run's message log.
///
/// Sequence numbers start at 0 per run and increase by one per append.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_run(&self, run_id: RunId) -> Result<(), MessageStoreError>;

    async fn run_exists(&self, run_id: RunId) -> Result<bool, MessageStoreError>;

    /// Returns only once the message is stored.
    async fn append(&self, run_id: RunId, message: &Message) -> Result<u64, MessageStoreError>;

    async fn load_messages(&self, run_id: RunId) -> Result<Vec<(u64, Message)>, MessageStoreError>;

    async fn delete_run(&self, run_id: RunId) -> Result<(), MessageStoreError>;

    /// Newest runs first.
    async fn list_runs(&self) -> Result<Vec<RunSummary>, MessageStoreError>;
}

struct StoredRun {
    created_at: DateTime<Utc>,
    messages: Vec<(u64, Message)>,
}

pub struct InMemoryMessageStore {
    runs: RwLock<HashMap<RunId, StoredRun>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_run(&self, run_id: RunId) -> Result<(), MessageStoreError> {
        let mut runs = self
            .runs
            .write()
            .map_err(|_| MessageStoreError::lock_poisoned("runs"))?;
        if runs.contains_key(&run_id) {
            return Err(MessageStoreError::RunAlreadyExists {
                run_id: run_id.to_string(),
            });
        }
        runs.insert(
            run_id,
            StoredRun {
                created_at: Utc::now(),
                messages: Vec::new(),
            },
        );
        Ok(())
    }

    async fn run_exists(&self, run_id: RunId) -> Result<bool, MessageStoreError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| MessageStoreError::lock_poisoned("runs"))?;
        Ok(runs.contains_key(&run_id))
    }

    async fn append(&self, run_id: RunId, message: &Message) -> Result<u64, MessageStoreError> {
        let mut runs = self
            .runs
            .write()
            .map_err(|_| MessageStoreError::lock_poisoned("runs"))?;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| MessageStoreError::run_not_found(run_id))?;

        let seq = run.messages.last().map_or(0, |(s, _)| s + 1);
        run.messages.push((seq, message.clone()));
        Ok(seq)
    }

    async fn load_messages(&self, run_id: RunId) -> Result<Vec<(u64, Message)>, MessageStoreError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| MessageStoreError::lock_poisoned("runs"))?;
        runs.get(&run_id)
            .map(|run| run.messages.clone())
            .ok_or_else(|| MessageStoreError::run_not_found(run_id))
    }

    async fn delete_run(&self, run_id: RunId) -> Result<(), MessageStoreError> {
        let mut runs = self
            .runs
            .write()
            .map_err(|_| MessageStoreError::lock_poisoned("runs"))?;
        runs.remove(&run_id)
            .map(|_| ())
            .ok_or_else(|| MessageStoreError::run_not_found(run_id))
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>, MessageStoreError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| MessageStoreError::lock_poisoned("runs"))?;
        let mut summaries: Vec<RunSummary> = runs
            .iter()
            .map(|(run_id, run)| RunSummary {
                run_id: *run_id,
                created_at: run.created_at,
                message_count: run.messages.len() as u64,
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }
}
