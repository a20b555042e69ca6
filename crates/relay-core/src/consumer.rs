//! Synchronous consumption of a run: block until the next unanswered
//! question or until the run finishes.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::coordinator::Subscription;
use crate::protocol::Message;
use crate::types::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CallResponseStatus {
    AwaitingInput,
    AwaitingConfirm,
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Consumed {
    /// Every message read after the skip point, including the interaction.
    pub messages: Vec<Message>,
    /// The request the run is now blocked on, if any.
    pub interaction: Option<Message>,
}

impl Consumed {
    pub fn status(&self) -> CallResponseStatus {
        match &self.interaction {
            Some(Message::InputRequest { .. }) => CallResponseStatus::AwaitingInput,
            Some(Message::ConfirmRequest { .. }) => CallResponseStatus::AwaitingConfirm,
            _ => CallResponseStatus::Complete,
        }
    }

    pub fn into_result(self, run_id: RunId) -> CallResponseResult {
        CallResponseResult {
            run_id,
            status: self.status(),
            messages: self.messages,
            interaction: self.interaction,
        }
    }
}

/// Response body of the call-response endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponseResult {
    pub run_id: RunId,
    pub status: CallResponseStatus,
    pub messages: Vec<Message>,
    pub interaction: Option<Message>,
}

/// Reads history and then live messages until an `input_request`,
/// `confirm_request` or `workflow_complete`.
///
/// With `after_id`, everything up to and including the non-request message
/// with that id (normally the answer just submitted) is skipped and not
/// returned. A channel that closes first yields what was read with no
/// interaction.
pub async fn consume_until_interaction(
    mut subscription: Subscription,
    after_id: Option<&str>,
) -> Consumed {
    let mut skipping = after_id.is_some();
    let mut messages = Vec::new();
    let mut history = subscription.take_history().into_iter();

    loop {
        let message = match history.next() {
            Some(message) => message,
            None => match subscription.recv().await {
                Some(message) => message,
                None => {
                    tracing::debug!(
                        run_id = %subscription.run_id,
                        read = messages.len(),
                        "Run stream closed before an interaction point"
                    );
                    return Consumed {
                        messages,
                        interaction: None,
                    };
                }
            },
        };

        if skipping {
            // A request shares its id with the answer; skipping ends at the answer.
            if after_id == Some(message.id()) && !message.is_request() {
                skipping = false;
            }
            continue;
        }

        match &message {
            Message::InputRequest { .. } | Message::ConfirmRequest { .. } => {
                messages.push(message.clone());
                return Consumed {
                    messages,
                    interaction: Some(message),
                };
            }
            Message::WorkflowComplete { .. } => {
                messages.push(message);
                return Consumed {
                    messages,
                    interaction: None,
                };
            }
            Message::Log { .. }
            | Message::InputReceived { .. }
            | Message::ConfirmReceived { .. }
            | Message::Loading { .. } => messages.push(message),
        }
    }
}
