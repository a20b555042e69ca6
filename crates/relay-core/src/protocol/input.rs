//! Field and button definitions carried by `input_request` messages.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::error::ProtocolError;

/// Name of the implicit field used when a prompt is sent without a schema.
pub const DEFAULT_INPUT_FIELD: &str = "input";

/// Key under which the pressed button's label travels in an answer.
pub const CHOICE_KEY: &str = "$choice";

pub const DEFAULT_BUTTON_LABEL: &str = "Continue";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldDefinition {
    Text {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        required: Option<bool>,
    },
    Number {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        required: Option<bool>,
    },
    Checkbox {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        required: Option<bool>,
    },
    Select {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        options: Vec<SelectOption>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        required: Option<bool>,
    },
}

impl FieldDefinition {
    pub fn text(label: impl Into<String>) -> Self {
        Self::Text {
            label: label.into(),
            description: None,
            placeholder: None,
            required: None,
        }
    }

    pub fn number(label: impl Into<String>) -> Self {
        Self::Number {
            label: label.into(),
            description: None,
            placeholder: None,
            required: None,
        }
    }

    pub fn checkbox(label: impl Into<String>) -> Self {
        Self::Checkbox {
            label: label.into(),
            description: None,
            required: None,
        }
    }

    pub fn select(label: impl Into<String>, options: Vec<SelectOption>) -> Self {
        Self::Select {
            label: label.into(),
            description: None,
            options,
            required: None,
        }
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::Text { description, .. }
            | Self::Number { description, .. }
            | Self::Checkbox { description, .. }
            | Self::Select { description, .. } => *description = Some(text.into()),
        }
        self
    }

    pub fn required(mut self) -> Self {
        match &mut self {
            Self::Text { required, .. }
            | Self::Number { required, .. }
            | Self::Checkbox { required, .. }
            | Self::Select { required, .. } => *required = Some(true),
        }
        self
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Text { label, .. }
            | Self::Number { label, .. }
            | Self::Checkbox { label, .. }
            | Self::Select { label, .. } => label,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Text { description, .. }
            | Self::Number { description, .. }
            | Self::Checkbox { description, .. }
            | Self::Select { description, .. } => description.as_deref(),
        }
    }

    fn validate(&self, name: &str) -> Result<(), ProtocolError> {
        match self {
            Self::Select { options, .. } if options.is_empty() => {
                Err(ProtocolError::EmptySelectOptions {
                    field: name.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Named fields of an input request, in the order they were declared.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputSchema(IndexMap<String, FieldDefinition>);

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema used for a bare prompt: one text field named `input`.
    pub fn single_text(label: impl Into<String>) -> Self {
        Self::new().field(DEFAULT_INPUT_FIELD, FieldDefinition::text(label))
    }

    pub fn field(mut self, name: impl Into<String>, definition: FieldDefinition) -> Self {
        self.0.insert(name.into(), definition);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldDefinition)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        for (name, field) in &self.0 {
            field.validate(name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ButtonIntent {
    #[default]
    Primary,
    Secondary,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    #[serde(default)]
    pub intent: ButtonIntent,
}

impl Button {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            intent: ButtonIntent::Primary,
        }
    }

    pub fn with_intent(mut self, intent: ButtonIntent) -> Self {
        self.intent = intent;
        self
    }
}

impl From<&str> for Button {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for Button {
    fn from(label: String) -> Self {
        Self::new(label)
    }
}

/// An absent or empty button list becomes a single primary "Continue" button.
pub fn normalize_buttons(buttons: Option<Vec<Button>>) -> Vec<Button> {
    match buttons {
        Some(buttons) if !buttons.is_empty() => buttons,
        _ => vec![Button::new(DEFAULT_BUTTON_LABEL)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_buttons_normalize_to_continue() {
        let buttons = normalize_buttons(None);
        assert_eq!(buttons, vec![Button::new("Continue")]);
        assert_eq!(buttons[0].intent, ButtonIntent::Primary);

        assert_eq!(normalize_buttons(Some(vec![])), buttons);
    }

    #[test]
    fn explicit_buttons_are_kept_in_order() {
        let buttons = normalize_buttons(Some(vec![
            Button::from("Submit"),
            Button::new("Skip").with_intent(ButtonIntent::Secondary),
        ]));
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0].label, "Submit");
        assert_eq!(buttons[1].intent, ButtonIntent::Secondary);
    }

    #[test]
    fn button_intent_defaults_when_deserializing() {
        let button: Button = serde_json::from_str(r#"{"label":"Go"}"#).unwrap();
        assert_eq!(button.intent, ButtonIntent::Primary);
    }

    #[test]
    fn schema_preserves_declaration_order() {
        let schema = InputSchema::new()
            .field("zeta", FieldDefinition::text("Zeta"))
            .field("alpha", FieldDefinition::checkbox("Alpha"));

        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.find("zeta").unwrap() < json.find("alpha").unwrap());
    }

    #[test]
    fn select_without_options_is_rejected() {
        let schema = InputSchema::new().field("reason", FieldDefinition::select("Reason", vec![]));
        assert_eq!(
            schema.validate(),
            Err(ProtocolError::EmptySelectOptions {
                field: "reason".to_string()
            })
        );
    }

    #[test]
    fn field_wire_shape_uses_type_tag() {
        let field = FieldDefinition::select(
            "Experience",
            vec![SelectOption::new("0-2", "0-2 years")],
        )
        .with_description("Years in the role");

        let value = serde_json::to_value(&field).unwrap();
        assert_eq!(value["type"], "select");
        assert_eq!(value["options"][0]["value"], "0-2");
        assert_eq!(value["description"], "Years in the role");
        assert!(value.get("required").is_none());
    }
}
