//! One actor per run owning the ordered message log, with live fan-out to
//! subscribers and replay of history to late joiners.

mod actor;
mod service;
pub mod store;
mod subscription;

pub use actor::{RunActorError, RunActorHandle};
pub use service::{CoordinatorError, CoordinatorHandle, CoordinatorService};
pub use store::{
    InMemoryMessageStore, MessageStore, MessageStoreError, RunSummary, SqliteMessageStore,
};
pub use subscription::Subscription;
