use thiserror::Error;

use crate::coordinator::{CoordinatorError, MessageStoreError};
use crate::engine::{JournalError, RunError};
use crate::protocol::ProtocolError;
use crate::workflow::WorkflowError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Store(#[from] MessageStoreError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Configuration(String),
}
