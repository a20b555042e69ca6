//! Pure pairing of requests with their answers, for rendering and for
//! deciding whether a run is waiting on a human.
//!
//! Matching is positional: a request is answered only by the message that
//! immediately follows it. An answer that arrives later, after some other
//! message, leaves the request outstanding and renders as a stray entry.

use std::collections::HashMap;

use crate::protocol::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum PairedEntry {
    /// Anything that is never paired: logs, stray answers, the terminal marker.
    Message(Message),
    Interaction {
        request: Message,
        answer: Option<Message>,
    },
    /// A loading marker with every later update for the same id folded in.
    Loading {
        id: String,
        text: String,
        complete: bool,
    },
}

impl PairedEntry {
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Interaction { answer: None, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PairedView {
    pub entries: Vec<PairedEntry>,
    pub complete: bool,
}

impl PairedView {
    pub fn outstanding(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(|entry| match entry {
            PairedEntry::Interaction {
                request,
                answer: None,
            } => Some(request),
            _ => None,
        })
    }

    /// The single request the run is blocked on, if any.
    ///
    /// Returns `None` once the run is complete, and also when more than one
    /// request is outstanding, since that log cannot be answered unambiguously.
    pub fn awaiting_response(&self) -> Option<&Message> {
        if self.complete {
            return None;
        }
        let mut outstanding = self.outstanding();
        match (outstanding.next(), outstanding.next()) {
            (Some(request), None) => Some(request),
            _ => None,
        }
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response().is_some()
    }
}

pub fn pair_messages(messages: &[Message]) -> PairedView {
    let mut view = PairedView::default();
    let mut loading_index: HashMap<&str, usize> = HashMap::new();
    let mut i = 0;

    while i < messages.len() {
        let message = &messages[i];
        match message {
            Message::InputRequest { .. } | Message::ConfirmRequest { .. } => {
                let answer = messages
                    .get(i + 1)
                    .filter(|next| next.answers(message))
                    .cloned();
                let step = if answer.is_some() { 2 } else { 1 };
                view.entries.push(PairedEntry::Interaction {
                    request: message.clone(),
                    answer,
                });
                i += step;
                continue;
            }
            Message::Loading { id, text, complete } => {
                if let Some(&index) = loading_index.get(id.as_str()) {
                    if let Some(PairedEntry::Loading {
                        text: current_text,
                        complete: current_complete,
                        ..
                    }) = view.entries.get_mut(index)
                    {
                        current_text.clone_from(text);
                        *current_complete = *complete;
                    }
                } else {
                    loading_index.insert(id.as_str(), view.entries.len());
                    view.entries.push(PairedEntry::Loading {
                        id: id.clone(),
                        text: text.clone(),
                        complete: *complete,
                    });
                }
            }
            Message::WorkflowComplete { .. } => {
                view.complete = true;
                view.entries.push(PairedEntry::Message(message.clone()));
            }
            Message::Log { .. }
            | Message::InputReceived { .. }
            | Message::ConfirmReceived { .. } => {
                view.entries.push(PairedEntry::Message(message.clone()));
            }
        }
        i += 1;
    }

    view
}
