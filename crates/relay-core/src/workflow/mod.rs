mod registry;
mod runner;

pub use registry::{WorkflowDefinition, WorkflowHandler, WorkflowMeta, WorkflowRegistry, slugify};
pub use runner::{RunnerConfig, StartedRun, WorkflowError, WorkflowRunner};
