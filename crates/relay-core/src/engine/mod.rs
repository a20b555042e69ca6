//! The durable execution contract the SDK is written against, and a local
//! journal-backed implementation of it.

mod events;
mod journal;
mod local;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::coordinator::CoordinatorError;
use crate::types::RunId;

pub use events::{EventBus, EventDelivery};
pub use journal::{
    InMemoryStepJournal, JournalEntryKind, JournalError, SqliteStepJournal, StepJournal,
};
pub use local::LocalEngine;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Timed out after {timeout:?} waiting for event '{event}'")]
    Timeout { event: String, timeout: Duration },

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Invalid payload for event '{event}': {message}")]
    InvalidPayload { event: String, message: String },

    #[error("Event source closed while waiting for '{event}'")]
    EventSourceClosed { event: String },

    #[error("Workflow failed: {0}")]
    Workflow(String),
}

impl RunError {
    pub fn invalid_payload(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event: event.into(),
            message: message.into(),
        }
    }

    pub fn workflow(message: impl Into<String>) -> Self {
        Self::Workflow(message.into())
    }
}

pub type StepFuture<'a> = BoxFuture<'a, Result<Value, RunError>>;

/// Durable execution as seen from inside a run.
///
/// `run_step` executes `step` at most once per name and returns the
/// recorded result on every later call with the same name. `await_event`
/// suspends until a payload for `name` is submitted, failing with
/// [`RunError::Timeout`] after `timeout`.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    fn run_id(&self) -> RunId;

    async fn run_step<'s>(&self, name: &str, step: StepFuture<'s>) -> Result<Value, RunError>;

    async fn await_event(&self, name: &str, timeout: Duration) -> Result<Value, RunError>;
}

/// [`ExecutionEngine::run_step`] for steps producing any serde type.
pub async fn run_step_typed<'s, T, F>(
    engine: &dyn ExecutionEngine,
    name: &str,
    step: F,
) -> Result<T, RunError>
where
    T: Serialize + DeserializeOwned + Send + 's,
    F: Future<Output = Result<T, RunError>> + Send + 's,
{
    let step = async move {
        let output = step.await?;
        serde_json::to_value(output).map_err(|e| RunError::Serialization {
            message: e.to_string(),
        })
    }
    .boxed();

    let value = engine.run_step(name, step).await?;
    serde_json::from_value(value).map_err(|e| RunError::Serialization {
        message: format!("Recorded result of step '{name}' does not match its type: {e}"),
    })
}
