use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::coordinator::CoordinatorHandle;
use crate::engine::{ExecutionEngine, RunError, run_step_typed};
use crate::protocol::{Button, InputSchema, Message};
use crate::types::RunId;

use super::namer::{CounterNamer, StepNamer};
use super::response::InputResponse;

pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Step and message id of the terminal marker.
pub const WORKFLOW_COMPLETE_ID: &str = "relay-workflow-complete";

/// Schema and buttons for [`RunContext::input_with`].
#[derive(Debug, Clone, Default)]
pub struct InputOptions {
    pub schema: Option<InputSchema>,
    pub buttons: Option<Vec<Button>>,
}

impl InputOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: InputSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn buttons<B: Into<Button>>(mut self, buttons: impl IntoIterator<Item = B>) -> Self {
        self.buttons = Some(buttons.into_iter().map(Into::into).collect());
        self
    }
}

/// Lets the body of [`RunContext::loading`] set the text shown once it
/// finishes.
#[derive(Debug, Clone)]
pub struct LoadingHandle {
    text: Arc<Mutex<String>>,
}

impl LoadingHandle {
    fn new(text: String) -> Self {
        Self {
            text: Arc::new(Mutex::new(text)),
        }
    }

    pub fn complete(&self, text: impl Into<String>) {
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = text.into();
    }

    pub fn text(&self) -> String {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The interaction surface handed to workflow handlers.
///
/// Every call derives its id from the injected [`StepNamer`], so a handler
/// must issue its calls in a deterministic order.
#[derive(Clone)]
pub struct RunContext {
    run_id: RunId,
    coordinator: CoordinatorHandle,
    engine: Arc<dyn ExecutionEngine>,
    namer: Arc<dyn StepNamer>,
    event_timeout: Duration,
    data: Option<Map<String, Value>>,
}

impl RunContext {
    pub fn new(coordinator: CoordinatorHandle, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            run_id: engine.run_id(),
            coordinator,
            engine,
            namer: Arc::new(CounterNamer::new()),
            event_timeout: DEFAULT_EVENT_TIMEOUT,
            data: None,
        }
    }

    pub fn with_namer(mut self, namer: Arc<dyn StepNamer>) -> Self {
        self.namer = namer;
        self
    }

    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = timeout;
        self
    }

    pub fn with_data(mut self, data: Option<Map<String, Value>>) -> Self {
        self.data = data;
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Upfront input the run was started with, if any.
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }

    pub(crate) fn set_data(&mut self, data: Map<String, Value>) {
        self.data = Some(data);
    }

    async fn append_in_step(&self, step_name: &str, message: Message) -> Result<(), RunError> {
        let coordinator = self.coordinator.clone();
        let run_id = self.run_id;

        self.engine
            .run_step(
                step_name,
                Box::pin(async move {
                    coordinator.append(run_id, message).await?;
                    Ok::<_, RunError>(Value::Null)
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn output(&self, text: impl Into<String>) -> Result<(), RunError> {
        let id = self.namer.next_name("output");
        let message = Message::log(id.clone(), text);
        self.append_in_step(&id, message).await
    }

    /// Asks for input and waits for the answer.
    ///
    /// The shape of the result follows the request: a bare prompt resolves
    /// to the typed value, custom buttons add the pressed label, and a
    /// schema returns every field.
    pub async fn input(
        &self,
        prompt: impl Into<String>,
        schema: Option<InputSchema>,
        buttons: Option<Vec<Button>>,
    ) -> Result<InputResponse, RunError> {
        let id = self.namer.next_name("input");
        let has_schema = schema.is_some();
        let has_buttons = buttons.as_ref().is_some_and(|b| !b.is_empty());

        let request = Message::input_request(id.clone(), prompt, schema, buttons);
        self.append_in_step(&format!("{id}-request"), request)
            .await?;

        let payload = self.engine.await_event(&id, self.event_timeout).await?;
        InputResponse::from_payload(&id, payload, has_schema, has_buttons)
    }

    pub async fn input_with(
        &self,
        prompt: impl Into<String>,
        options: InputOptions,
    ) -> Result<InputResponse, RunError> {
        self.input(prompt, options.schema, options.buttons).await
    }

    /// A bare prompt whose answer must be text.
    pub async fn input_text(&self, prompt: impl Into<String>) -> Result<String, RunError> {
        let response = self.input(prompt, None, None).await?;
        match response {
            InputResponse::Value(Value::String(text)) => Ok(text),
            other => Err(RunError::invalid_payload(
                "input",
                format!("expected text, got {}", other.value()),
            )),
        }
    }

    pub async fn confirm(&self, message: impl Into<String>) -> Result<bool, RunError> {
        let id = self.namer.next_name("confirm");

        let request = Message::confirm_request(id.clone(), message);
        self.append_in_step(&format!("{id}-request"), request)
            .await?;

        let payload = self.engine.await_event(&id, self.event_timeout).await?;
        payload
            .get("approved")
            .and_then(Value::as_bool)
            .ok_or_else(|| RunError::invalid_payload(&id, "missing boolean 'approved'"))
    }

    /// Shows a progress marker while `body` runs, then marks it complete
    /// with whatever text the body set through its [`LoadingHandle`].
    pub async fn loading<T, F, Fut>(&self, text: impl Into<String>, body: F) -> Result<T, RunError>
    where
        F: FnOnce(LoadingHandle) -> Fut,
        Fut: Future<Output = Result<T, RunError>>,
    {
        let id = self.namer.next_name("loading");
        let text = text.into();

        self.append_in_step(
            &format!("{id}-start"),
            Message::loading(id.clone(), text.clone(), false),
        )
        .await?;

        let handle = LoadingHandle::new(text);
        let output = body(handle.clone()).await?;

        self.append_in_step(
            &format!("{id}-complete"),
            Message::loading(id.clone(), handle.text(), true),
        )
        .await?;

        Ok(output)
    }

    /// A memoized step of business logic: `f` runs once, and its recorded
    /// result is returned on replay.
    pub async fn step<T, F, Fut>(&self, name: &str, f: F) -> Result<T, RunError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RunError>> + Send,
    {
        run_step_typed(self.engine.as_ref(), name, f()).await
    }

    pub(crate) async fn complete(&self) -> Result<(), RunError> {
        self.append_in_step(
            WORKFLOW_COMPLETE_ID,
            Message::workflow_complete(WORKFLOW_COMPLETE_ID),
        )
        .await
    }
}
