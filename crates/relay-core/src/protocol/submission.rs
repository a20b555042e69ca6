use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ProtocolError;
use super::message::Message;

/// An answer arriving from outside the run, addressed to the event a
/// request is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Submission {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Splits the submission into the `*_received` message to log and the
    /// payload to raise on the engine.
    ///
    /// A boolean `approved` marks a confirmation; anything else is treated as
    /// form input and must be a JSON object.
    pub fn into_parts(self) -> Result<(Message, Value), ProtocolError> {
        if self.event.is_empty() {
            return Err(ProtocolError::EmptyId);
        }

        if let Some(approved) = self.data.get("approved").and_then(Value::as_bool) {
            let mut payload = Map::new();
            payload.insert("approved".to_string(), Value::Bool(approved));
            return Ok((
                Message::confirm_received(self.event, approved),
                Value::Object(payload),
            ));
        }

        let value = match self.data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ProtocolError::malformed(
                    "input_received",
                    format!("expected an object of field values, got {other}"),
                ));
            }
        };
        let payload = Value::Object(value.clone());
        Ok((Message::input_received(self.event, value), payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn approved_flag_becomes_confirmation() {
        let (message, payload) = Submission::new("relay-confirm-2", json!({"approved": false}))
            .into_parts()
            .unwrap();

        assert_eq!(message, Message::confirm_received("relay-confirm-2", false));
        assert_eq!(payload, json!({"approved": false}));
    }

    #[test]
    fn form_data_becomes_input_received() {
        let (message, payload) =
            Submission::new("relay-input-0", json!({"input": "Ada", "$choice": "Continue"}))
                .into_parts()
                .unwrap();

        let Message::InputReceived { id, value } = &message else {
            unreachable!("expected input_received")
        };
        assert_eq!(id, "relay-input-0");
        assert_eq!(value.get("input"), Some(&json!("Ada")));
        assert_eq!(payload, json!({"input": "Ada", "$choice": "Continue"}));
    }

    #[test]
    fn non_boolean_approved_is_form_data() {
        let (message, _) = Submission::new("relay-input-3", json!({"approved": "yes"}))
            .into_parts()
            .unwrap();
        assert!(matches!(message, Message::InputReceived { .. }));
    }

    #[test]
    fn scalar_data_is_rejected() {
        let err = Submission::new("relay-input-0", json!(42))
            .into_parts()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }
}
