//! Wire shape of run notifications and the request/answer correlation rule.

pub mod error;
pub mod input;
pub mod message;
pub mod submission;

pub use error::ProtocolError;
pub use input::{
    Button, ButtonIntent, CHOICE_KEY, DEFAULT_BUTTON_LABEL, DEFAULT_INPUT_FIELD, FieldDefinition,
    InputSchema, SelectOption, normalize_buttons,
};
pub use message::{Message, MessageKind};
pub use submission::Submission;
