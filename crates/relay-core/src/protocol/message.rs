use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use super::error::ProtocolError;
use super::input::{Button, InputSchema, normalize_buttons};

/// Discriminant of a [`Message`], as it appears in the wire `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    Log,
    InputRequest,
    InputReceived,
    ConfirmRequest,
    ConfirmReceived,
    Loading,
    WorkflowComplete,
}

impl MessageKind {
    pub fn is_request(self) -> bool {
        matches!(self, Self::InputRequest | Self::ConfirmRequest)
    }
}

/// One immutable entry of a run's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Log {
        id: String,
        text: String,
    },
    InputRequest {
        id: String,
        prompt: String,
        schema: InputSchema,
        buttons: Vec<Button>,
    },
    InputReceived {
        id: String,
        value: Map<String, Value>,
    },
    ConfirmRequest {
        id: String,
        message: String,
    },
    ConfirmReceived {
        id: String,
        approved: bool,
    },
    /// A progress marker. The completing update reuses the id of the start.
    Loading {
        id: String,
        text: String,
        complete: bool,
    },
    WorkflowComplete {
        id: String,
    },
}

impl Message {
    pub fn log(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Log {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Builds an input request, normalizing shorthand: without a schema the
    /// prompt becomes a single text field named `input`, and without buttons
    /// a primary "Continue" button is offered.
    pub fn input_request(
        id: impl Into<String>,
        prompt: impl Into<String>,
        schema: Option<InputSchema>,
        buttons: Option<Vec<Button>>,
    ) -> Self {
        let prompt = prompt.into();
        let schema = schema.unwrap_or_else(|| InputSchema::single_text(prompt.clone()));
        Self::InputRequest {
            id: id.into(),
            prompt,
            schema,
            buttons: normalize_buttons(buttons),
        }
    }

    pub fn input_received(id: impl Into<String>, value: Map<String, Value>) -> Self {
        Self::InputReceived {
            id: id.into(),
            value,
        }
    }

    pub fn confirm_request(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfirmRequest {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn confirm_received(id: impl Into<String>, approved: bool) -> Self {
        Self::ConfirmReceived {
            id: id.into(),
            approved,
        }
    }

    pub fn loading(id: impl Into<String>, text: impl Into<String>, complete: bool) -> Self {
        Self::Loading {
            id: id.into(),
            text: text.into(),
            complete,
        }
    }

    pub fn workflow_complete(id: impl Into<String>) -> Self {
        Self::WorkflowComplete { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Log { id, .. }
            | Self::InputRequest { id, .. }
            | Self::InputReceived { id, .. }
            | Self::ConfirmRequest { id, .. }
            | Self::ConfirmReceived { id, .. }
            | Self::Loading { id, .. }
            | Self::WorkflowComplete { id } => id,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Log { .. } => MessageKind::Log,
            Self::InputRequest { .. } => MessageKind::InputRequest,
            Self::InputReceived { .. } => MessageKind::InputReceived,
            Self::ConfirmRequest { .. } => MessageKind::ConfirmRequest,
            Self::ConfirmReceived { .. } => MessageKind::ConfirmReceived,
            Self::Loading { .. } => MessageKind::Loading,
            Self::WorkflowComplete { .. } => MessageKind::WorkflowComplete,
        }
    }

    pub fn is_request(&self) -> bool {
        self.kind().is_request()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WorkflowComplete { .. })
    }

    /// True when `self` is the answer correlated with `request`: the matching
    /// received-kind carrying the same id.
    pub fn answers(&self, request: &Message) -> bool {
        match (request, self) {
            (Self::InputRequest { id: asked, .. }, Self::InputReceived { id, .. })
            | (Self::ConfirmRequest { id: asked, .. }, Self::ConfirmReceived { id, .. }) => {
                asked == id
            }
            _ => false,
        }
    }

    /// Checks a single message in isolation. Correlation across messages is
    /// never inspected here.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.id().is_empty() {
            return Err(ProtocolError::EmptyId);
        }
        if let Self::InputRequest {
            schema, buttons, ..
        } = self
        {
            schema.validate()?;
            if buttons.is_empty() {
                return Err(ProtocolError::NoButtons);
            }
        }
        Ok(())
    }

    /// Parses and validates a message received at a boundary.
    pub fn parse(value: Value) -> Result<Self, ProtocolError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingKind)?;
        let kind = MessageKind::from_str(kind).map_err(|_| ProtocolError::UnknownKind {
            kind: kind.to_string(),
        })?;

        let message: Message = serde_json::from_value(value)
            .map_err(|e| ProtocolError::malformed(kind.to_string(), e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    /// Parses one line of an NDJSON stream.
    pub fn parse_ndjson_line(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line.trim()).map_err(|e| {
            ProtocolError::InvalidJson {
                message: e.to_string(),
            }
        })?;
        Self::parse(value)
    }

    /// Renders the message as one NDJSON line, newline included.
    pub fn to_ndjson_line(&self) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(self).map_err(|e| ProtocolError::InvalidJson {
            message: e.to_string(),
        })?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::input::{ButtonIntent, DEFAULT_INPUT_FIELD, FieldDefinition};
    use serde_json::json;

    #[test]
    fn bare_prompt_normalizes_to_single_text_field() {
        let message = Message::input_request("relay-input-0", "Name?", None, None);

        let Message::InputRequest {
            prompt,
            schema,
            buttons,
            ..
        } = &message
        else {
            unreachable!("expected input request")
        };
        assert_eq!(prompt, "Name?");
        assert_eq!(schema.len(), 1);
        assert_eq!(
            schema.get(DEFAULT_INPUT_FIELD),
            Some(&FieldDefinition::text("Name?"))
        );
        assert_eq!(buttons.len(), 1);
        assert_eq!(buttons[0].label, "Continue");
        assert_eq!(buttons[0].intent, ButtonIntent::Primary);
    }

    #[test]
    fn wire_shape_uses_snake_case_type_tag() {
        let value = serde_json::to_value(Message::confirm_received("c1", true)).unwrap();
        assert_eq!(
            value,
            json!({"type": "confirm_received", "id": "c1", "approved": true})
        );

        let value = serde_json::to_value(Message::workflow_complete("done")).unwrap();
        assert_eq!(value, json!({"type": "workflow_complete", "id": "done"}));
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let err = Message::parse(json!({"type": "shout", "id": "x"})).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnknownKind {
                kind: "shout".to_string()
            }
        );
    }

    #[test]
    fn parse_rejects_missing_kind() {
        let err = Message::parse(json!({"id": "x", "text": "hi"})).unwrap_err();
        assert_eq!(err, ProtocolError::MissingKind);
    }

    #[test]
    fn parse_rejects_missing_field() {
        let err = Message::parse(json!({"type": "log", "id": "x"})).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { ref kind, .. } if kind == "log"));

        let err = Message::parse(json!({
            "type": "input_request",
            "id": "i1",
            "prompt": "Name?",
            "schema": {"input": {"type": "text", "label": "Name?"}}
        }))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { ref kind, .. } if kind == "input_request"));
    }

    #[test]
    fn parse_rejects_empty_id() {
        let err = Message::parse(json!({"type": "log", "id": "", "text": "hi"})).unwrap_err();
        assert_eq!(err, ProtocolError::EmptyId);
    }

    #[test]
    fn parse_accepts_request_without_fields() {
        let message = Message::parse(json!({
            "type": "input_request",
            "id": "relay-input-0",
            "prompt": "Ready?",
            "schema": {},
            "buttons": [{"label": "Go"}]
        }))
        .unwrap();
        assert_eq!(message.kind(), MessageKind::InputRequest);
    }

    #[test]
    fn parse_accepts_received_with_choice() {
        let message = Message::parse(json!({
            "type": "input_received",
            "id": "relay-input-1",
            "value": {"input": "yes", "$choice": "Let's go!"}
        }))
        .unwrap();
        assert_eq!(message.kind(), MessageKind::InputReceived);
        assert_eq!(message.id(), "relay-input-1");
    }

    #[test]
    fn ndjson_line_is_newline_terminated_and_parses_back() {
        let message = Message::loading("relay-loading-2", "Fetching", false);
        let line = message.to_ndjson_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(Message::parse_ndjson_line(&line).unwrap(), message);
    }

    #[test]
    fn parse_ndjson_line_reports_bad_json() {
        let err = Message::parse_ndjson_line("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson { .. }));
    }

    #[test]
    fn answers_requires_matching_kind_and_id() {
        let input = Message::input_request("i1", "Name?", None, None);
        let confirm = Message::confirm_request("c1", "Sure?");

        assert!(Message::input_received("i1", Map::new()).answers(&input));
        assert!(!Message::input_received("i2", Map::new()).answers(&input));
        assert!(!Message::confirm_received("i1", true).answers(&input));
        assert!(Message::confirm_received("c1", false).answers(&confirm));
        assert!(!Message::log("i1", "noise").answers(&input));
    }
}
