//! Calls available to workflow business logic: `output`, `input`,
//! `confirm` and `loading`, each expressed as memoized engine steps.

mod context;
mod namer;
mod response;

pub use context::{
    DEFAULT_EVENT_TIMEOUT, InputOptions, LoadingHandle, RunContext, WORKFLOW_COMPLETE_ID,
};
pub use namer::{CounterNamer, StepNamer};
pub use response::InputResponse;
