use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coordinator::{InMemoryMessageStore, MessageStore, SqliteMessageStore};
use crate::engine::{InMemoryStepJournal, SqliteStepJournal, StepJournal};
use crate::error::{Error, Result};

/// Where run logs and step journals are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// SQLite database file, shared by the message store and journal.
    Sqlite { path: PathBuf },
    /// Process-local; everything is lost on exit.
    Memory,
}

impl StoreConfig {
    pub fn sqlite(path: PathBuf) -> Self {
        Self::Sqlite { path }
    }

    pub fn default_sqlite() -> Result<Self> {
        let home_dir = dirs::home_dir().ok_or_else(|| {
            Error::Configuration("Could not determine home directory".to_string())
        })?;
        Ok(Self::sqlite(home_dir.join(".relay").join("runs.db")))
    }

    pub async fn open(&self) -> Result<Storage> {
        match self {
            Self::Sqlite { path } => {
                let store = SqliteMessageStore::new(path).await?;
                let journal = SqliteStepJournal::new(store.pool()).await?;
                tracing::info!(path = %path.display(), "Opened SQLite run store");
                Ok(Storage {
                    messages: Arc::new(store),
                    journal: Arc::new(journal),
                })
            }
            Self::Memory => Ok(Storage {
                messages: Arc::new(InMemoryMessageStore::new()),
                journal: Arc::new(InMemoryStepJournal::new()),
            }),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::default_sqlite().unwrap_or_else(|_| Self::sqlite(PathBuf::from("./runs.db")))
    }
}

pub struct Storage {
    pub messages: Arc<dyn MessageStore>,
    pub journal: Arc<dyn StepJournal>,
}
