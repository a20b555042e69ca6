mod message_store;
mod sqlite_store;

pub use message_store::{InMemoryMessageStore, MessageStore, MessageStoreError, RunSummary};
pub use sqlite_store::SqliteMessageStore;
