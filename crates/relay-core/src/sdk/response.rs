use serde_json::{Map, Value};

use crate::engine::RunError;
use crate::protocol::{CHOICE_KEY, DEFAULT_INPUT_FIELD};

/// What an `input` call resolves to, shaped by how the request was asked.
#[derive(Debug, Clone, PartialEq)]
pub enum InputResponse {
    /// A bare prompt: the value typed into the implicit `input` field.
    Value(Value),
    /// A bare prompt offered with custom buttons.
    Choice {
        value: Value,
        choice: Option<String>,
    },
    /// A request with a schema: every submitted field, plus `$choice` when
    /// a button label was sent.
    Fields(Map<String, Value>),
}

impl InputResponse {
    pub(crate) fn from_payload(
        event: &str,
        payload: Value,
        has_schema: bool,
        has_buttons: bool,
    ) -> Result<Self, RunError> {
        let Value::Object(mut fields) = payload else {
            return Err(RunError::invalid_payload(event, "expected an object"));
        };

        if has_schema {
            return Ok(Self::Fields(fields));
        }

        let value = fields.remove(DEFAULT_INPUT_FIELD).unwrap_or(Value::Null);
        if has_buttons {
            let choice = fields
                .remove(CHOICE_KEY)
                .and_then(|choice| choice.as_str().map(str::to_string));
            return Ok(Self::Choice { value, choice });
        }

        Ok(Self::Value(value))
    }

    /// The primary value: the `input` field for bare prompts, the whole map
    /// for schema requests.
    pub fn value(&self) -> Value {
        match self {
            Self::Value(value) | Self::Choice { value, .. } => value.clone(),
            Self::Fields(fields) => Value::Object(fields.clone()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Value(value) | Self::Choice { value, .. } => value.as_str(),
            Self::Fields(fields) => fields.get(DEFAULT_INPUT_FIELD).and_then(Value::as_str),
        }
    }

    pub fn choice(&self) -> Option<&str> {
        match self {
            Self::Value(_) => None,
            Self::Choice { choice, .. } => choice.as_deref(),
            Self::Fields(fields) => fields.get(CHOICE_KEY).and_then(Value::as_str),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Fields(fields) => fields.get(name),
            Self::Value(value) | Self::Choice { value, .. } => {
                (name == DEFAULT_INPUT_FIELD).then_some(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_prompt_unwraps_input_field() {
        let response =
            InputResponse::from_payload("e", json!({"input": "Ada"}), false, false).unwrap();
        assert_eq!(response, InputResponse::Value(json!("Ada")));
        assert_eq!(response.as_text(), Some("Ada"));
    }

    #[test]
    fn buttons_without_schema_carry_choice() {
        let response = InputResponse::from_payload(
            "e",
            json!({"input": "hi", "$choice": "Let's go!"}),
            false,
            true,
        )
        .unwrap();
        assert_eq!(response.choice(), Some("Let's go!"));
        assert_eq!(response.value(), json!("hi"));
    }

    #[test]
    fn schema_returns_all_fields() {
        let response = InputResponse::from_payload(
            "e",
            json!({"name": "Ada", "subscribe": true, "$choice": "Submit"}),
            true,
            true,
        )
        .unwrap();
        assert_eq!(response.field("subscribe"), Some(&json!(true)));
        assert_eq!(response.choice(), Some("Submit"));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = InputResponse::from_payload("e", json!("Ada"), false, false).unwrap_err();
        assert!(matches!(err, RunError::InvalidPayload { .. }));
    }
}
