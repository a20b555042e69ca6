use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::consumer::{CallResponseResult, consume_until_interaction};
use crate::coordinator::{CoordinatorError, CoordinatorHandle};
use crate::engine::{
    EventBus, EventDelivery, JournalEntryKind, JournalError, LocalEngine, RunError, StepJournal,
};
use crate::pairing::pair_messages;
use crate::protocol::{Message, ProtocolError, Submission};
use crate::sdk::{DEFAULT_EVENT_TIMEOUT, InputResponse, RunContext};
use crate::types::RunId;

use super::registry::{WorkflowDefinition, WorkflowRegistry};

/// Journal entry holding the workflow name and prefilled data of a run.
const RUN_PARAMS_STEP: &str = "relay-run-params";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Unknown workflow: {name}")]
    UnknownWorkflow { name: String },

    #[error("Run {run_id} has no recorded parameters and cannot be resumed")]
    NotResumable { run_id: String },

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("Invalid run parameters: {message}")]
    InvalidParams { message: String },

    #[error("Run {run_id} is not executing")]
    NotRunning { run_id: String },

    #[error("Run {run_id} is not waiting on '{event}'")]
    NotAwaiting { run_id: String, event: String },
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub event_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            event_timeout: DEFAULT_EVENT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunParams {
    name: String,
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

pub struct StartedRun {
    pub run_id: RunId,
    pub task: JoinHandle<()>,
}

/// Starts workflow handlers as runs and routes answers back into them.
#[derive(Clone)]
pub struct WorkflowRunner {
    registry: Arc<WorkflowRegistry>,
    coordinator: CoordinatorHandle,
    journal: Arc<dyn StepJournal>,
    events: EventBus,
    config: RunnerConfig,
    executing: Arc<Mutex<HashSet<RunId>>>,
}

impl WorkflowRunner {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        coordinator: CoordinatorHandle,
        journal: Arc<dyn StepJournal>,
        events: EventBus,
        config: RunnerConfig,
    ) -> Self {
        Self {
            registry,
            coordinator,
            journal,
            events,
            config,
            executing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    /// Creates a run for workflow `name` and spawns its handler.
    pub async fn start(
        &self,
        name: &str,
        data: Option<Map<String, Value>>,
    ) -> Result<StartedRun, WorkflowError> {
        let (run_id, definition) = self.create(name, data.clone()).await?;
        let task = self.spawn_execution(run_id, definition, data).await;
        Ok(StartedRun { run_id, task })
    }

    async fn create(
        &self,
        name: &str,
        data: Option<Map<String, Value>>,
    ) -> Result<(RunId, WorkflowDefinition), WorkflowError> {
        let definition = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownWorkflow {
                name: name.to_string(),
            })?;

        let run_id = self.coordinator.create_run().await?;

        let params = RunParams {
            name: definition.slug.clone(),
            data,
        };
        let params = serde_json::to_value(&params).map_err(|e| WorkflowError::InvalidParams {
            message: e.to_string(),
        })?;
        self.journal
            .record(run_id, JournalEntryKind::Step, RUN_PARAMS_STEP, &params)
            .await?;

        tracing::info!(run_id = %run_id, workflow = %definition.slug, "Starting workflow");

        Ok((run_id, definition))
    }

    /// Re-executes the handler of an existing run. Recorded steps and
    /// answered events replay from the journal, so only work that never
    /// finished runs again.
    pub async fn resume(&self, run_id: RunId) -> Result<StartedRun, WorkflowError> {
        let params = self
            .journal
            .load(run_id, JournalEntryKind::Step, RUN_PARAMS_STEP)
            .await?
            .ok_or_else(|| WorkflowError::NotResumable {
                run_id: run_id.to_string(),
            })?;
        let params: RunParams =
            serde_json::from_value(params).map_err(|e| WorkflowError::InvalidParams {
                message: e.to_string(),
            })?;

        let definition = self
            .registry
            .get(&params.name)
            .cloned()
            .ok_or(WorkflowError::UnknownWorkflow { name: params.name })?;

        tracing::info!(run_id = %run_id, workflow = %definition.slug, "Resuming workflow");

        let task = self.spawn_execution(run_id, definition, params.data).await;
        Ok(StartedRun { run_id, task })
    }

    /// Resumes every stored run that has not completed. Runs that cannot be
    /// resumed are logged and skipped.
    pub async fn resume_incomplete(&self) -> Result<Vec<RunId>, WorkflowError> {
        let mut resumed = Vec::new();

        for summary in self.coordinator.list_runs().await? {
            let run_id = summary.run_id;
            let history = self.coordinator.history(run_id).await?;
            if history.last().is_some_and(Message::is_terminal) {
                continue;
            }

            match self.resume(run_id).await {
                Ok(_) => resumed.push(run_id),
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "Skipping run that cannot be resumed");
                }
            }
        }

        Ok(resumed)
    }

    /// Removes a run's log, journal and pending events.
    pub async fn delete_run(&self, run_id: RunId) -> Result<(), WorkflowError> {
        self.coordinator.delete_run(run_id).await?;
        self.journal.clear_run(run_id).await?;
        self.events.clear_run(run_id).await;

        tracing::info!(run_id = %run_id, "Deleted run");
        Ok(())
    }

    /// Records an answer in the run's log, then wakes the step waiting on it.
    pub async fn submit_event(
        &self,
        run_id: RunId,
        submission: Submission,
    ) -> Result<EventDelivery, WorkflowError> {
        let (message, payload) = submission.into_parts()?;
        let event = message.id().to_string();

        self.coordinator.append(run_id, message).await?;
        let delivery = self.events.submit(run_id, &event, payload).await;

        tracing::debug!(run_id = %run_id, event = %event, ?delivery, "Submitted event");
        Ok(delivery)
    }

    /// Starts a run and blocks until its first interaction point.
    pub async fn start_and_wait(
        &self,
        name: &str,
        data: Option<Map<String, Value>>,
    ) -> Result<CallResponseResult, WorkflowError> {
        let (run_id, definition) = self.create(name, data.clone()).await?;
        // Subscribed before the handler exists, so even an immediate failure
        // closes this channel.
        let subscription = self.coordinator.subscribe(run_id).await?;
        self.spawn_execution(run_id, definition, data).await;

        let consumed = consume_until_interaction(subscription, None).await;
        Ok(consumed.into_result(run_id))
    }

    /// Submits an answer and blocks until the next interaction point.
    pub async fn respond_and_wait(
        &self,
        run_id: RunId,
        submission: Submission,
    ) -> Result<CallResponseResult, WorkflowError> {
        // Subscribe first so nothing appended after the answer can be missed.
        let subscription = self.coordinator.subscribe(run_id).await?;
        let event = submission.event.clone();

        // A completed run falls through so the append reports it.
        let view = pair_messages(&subscription.history);
        if !view.complete {
            if !self.is_executing(run_id).await {
                return Err(WorkflowError::NotRunning {
                    run_id: run_id.to_string(),
                });
            }
            if !view.outstanding().any(|request| request.id() == event) {
                return Err(WorkflowError::NotAwaiting {
                    run_id: run_id.to_string(),
                    event,
                });
            }
        }

        self.submit_event(run_id, submission).await?;

        let consumed = consume_until_interaction(subscription, Some(&event)).await;
        Ok(consumed.into_result(run_id))
    }

    async fn spawn_execution(
        &self,
        run_id: RunId,
        definition: WorkflowDefinition,
        data: Option<Map<String, Value>>,
    ) -> JoinHandle<()> {
        let engine = Arc::new(LocalEngine::new(
            run_id,
            self.journal.clone(),
            self.events.clone(),
        ));
        let ctx = RunContext::new(self.coordinator.clone(), engine)
            .with_event_timeout(self.config.event_timeout)
            .with_data(data);
        let coordinator = self.coordinator.clone();
        let executing = self.executing.clone();

        executing.lock().await.insert(run_id);

        tokio::spawn(async move {
            let slug = definition.slug.clone();
            let result = execute(&definition, ctx).await;
            executing.lock().await.remove(&run_id);

            match result {
                Ok(()) => {
                    tracing::info!(run_id = %run_id, workflow = %slug, "Workflow completed");
                }
                Err(e) => {
                    tracing::error!(
                        run_id = %run_id,
                        workflow = %slug,
                        error = %e,
                        "Workflow stopped"
                    );
                    // Closes the live channels so blocked consumers return.
                    if let Err(e) = coordinator.suspend_run(run_id).await {
                        tracing::warn!(run_id = %run_id, error = %e, "Failed to suspend stopped run");
                    }
                }
            }
        })
    }

    pub async fn is_executing(&self, run_id: RunId) -> bool {
        self.executing.lock().await.contains(&run_id)
    }
}

async fn execute(definition: &WorkflowDefinition, mut ctx: RunContext) -> Result<(), RunError> {
    if let Some(schema) = &definition.input {
        if ctx.data().is_none() {
            let response = ctx
                .input(definition.title.clone(), Some(schema.clone()), None)
                .await?;
            if let InputResponse::Fields(fields) = response {
                ctx.set_data(fields);
            }
        }
    }

    definition.call(ctx.clone()).await?;
    ctx.complete().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{CoordinatorService, InMemoryMessageStore};
    use crate::engine::InMemoryStepJournal;
    use crate::workflow::WorkflowDefinition;

    fn runner(registry: WorkflowRegistry) -> (CoordinatorService, WorkflowRunner) {
        let service = CoordinatorService::spawn(Arc::new(InMemoryMessageStore::new()));
        let runner = WorkflowRunner::new(
            Arc::new(registry),
            service.handle(),
            Arc::new(InMemoryStepJournal::new()),
            EventBus::new(),
            RunnerConfig::default(),
        );
        (service, runner)
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_rejected() {
        let (service, runner) = runner(WorkflowRegistry::new());

        let result = runner.start("missing", None).await;
        assert!(matches!(result, Err(WorkflowError::UnknownWorkflow { .. })));
        assert!(service.handle.list_runs().await.unwrap().is_empty());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_handler_completion_appends_marker() {
        let registry = WorkflowRegistry::new().with(WorkflowDefinition::new(
            "Hello",
            |ctx: RunContext| async move { ctx.output("hi").await },
        ));
        let (service, runner) = runner(registry);

        let started = runner.start("hello", None).await.unwrap();
        started.task.await.unwrap();

        let history = service.handle.history(started.run_id).await.unwrap();
        assert_eq!(
            history,
            vec![
                Message::log("relay-output-0", "hi"),
                Message::workflow_complete("relay-workflow-complete"),
            ]
        );

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_prefilled_data_skips_upfront_input() {
        let registry = WorkflowRegistry::new().with(
            WorkflowDefinition::new("Greet", |ctx: RunContext| async move {
                let name = ctx
                    .data()
                    .and_then(|d| d.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("stranger")
                    .to_string();
                ctx.output(format!("Hello, {name}")).await
            })
            .with_input(
                crate::protocol::InputSchema::new()
                    .field("name", crate::protocol::FieldDefinition::text("Name")),
            ),
        );
        let (service, runner) = runner(registry);

        let mut data = Map::new();
        data.insert("name".to_string(), Value::from("Ada"));
        let result = runner.start_and_wait("greet", Some(data)).await.unwrap();

        assert_eq!(
            result.messages.first(),
            Some(&Message::log("relay-output-0", "Hello, Ada"))
        );

        service.shutdown().await;
    }
}
