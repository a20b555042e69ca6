use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, oneshot};

use crate::types::RunId;

enum Slot {
    Waiting(oneshot::Sender<Value>),
    Buffered(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDelivery {
    /// A waiter was parked on the event and received the payload.
    Delivered,
    /// Nobody was waiting; the payload is held for the next listener.
    Buffered,
    /// A payload was already pending for this event; the new one was dropped.
    Duplicate,
}

/// Process-wide mailbox of named events, keyed by run.
#[derive(Clone, Default)]
pub struct EventBus {
    slots: Arc<Mutex<HashMap<(RunId, String), Slot>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn submit(&self, run_id: RunId, name: &str, payload: Value) -> EventDelivery {
        let mut slots = self.slots.lock().await;
        let key = (run_id, name.to_string());

        let payload = match slots.remove(&key) {
            Some(Slot::Waiting(tx)) => match tx.send(payload) {
                Ok(()) => return EventDelivery::Delivered,
                // The waiter gave up; keep the payload for a later listener.
                Err(payload) => payload,
            },
            Some(Slot::Buffered(existing)) => {
                tracing::warn!(
                    run_id = %run_id,
                    event = %name,
                    "Event already pending, dropping duplicate submission"
                );
                slots.insert(key, Slot::Buffered(existing));
                return EventDelivery::Duplicate;
            }
            None => payload,
        };

        slots.insert(key, Slot::Buffered(payload));
        EventDelivery::Buffered
    }

    /// Registers interest in `name`. A payload submitted before this call is
    /// handed over immediately.
    pub async fn listen(&self, run_id: RunId, name: &str) -> oneshot::Receiver<Value> {
        let mut slots = self.slots.lock().await;
        let key = (run_id, name.to_string());
        let (tx, rx) = oneshot::channel();

        match slots.remove(&key) {
            Some(Slot::Buffered(payload)) => {
                let _ = tx.send(payload);
            }
            Some(Slot::Waiting(_)) | None => {
                slots.insert(key, Slot::Waiting(tx));
            }
        }

        rx
    }

    /// Drops a parked waiter for `name`, leaving any buffered payload alone.
    pub async fn forget(&self, run_id: RunId, name: &str) {
        let mut slots = self.slots.lock().await;
        let key = (run_id, name.to_string());
        if matches!(slots.get(&key), Some(Slot::Waiting(_))) {
            slots.remove(&key);
        }
    }

    pub async fn clear_run(&self, run_id: RunId) {
        let mut slots = self.slots.lock().await;
        slots.retain(|(id, _), _| *id != run_id);
    }
}
