use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Message is missing its \"type\" tag")]
    MissingKind,

    #[error("Unknown message kind: {kind}")]
    UnknownKind { kind: String },

    #[error("Invalid {kind} message: {message}")]
    Malformed { kind: String, message: String },

    #[error("Message id must not be empty")]
    EmptyId,

    #[error("Select field '{field}' has no options")]
    EmptySelectOptions { field: String },

    #[error("Input request must offer at least one button")]
    NoButtons,

    #[error("Run {run_id} is complete; no further messages are accepted")]
    RunComplete { run_id: String },
}

impl ProtocolError {
    pub fn malformed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            kind: kind.into(),
            message: message.into(),
        }
    }
}
