use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::RunId;

use super::events::EventBus;
use super::journal::{JournalEntryKind, StepJournal};
use super::{ExecutionEngine, RunError, StepFuture};

/// Runs steps in-process, memoizing them in a [`StepJournal`] so a handler
/// re-executed for the same run replays recorded results instead of
/// repeating side effects.
pub struct LocalEngine {
    run_id: RunId,
    journal: Arc<dyn StepJournal>,
    events: EventBus,
}

impl LocalEngine {
    pub fn new(run_id: RunId, journal: Arc<dyn StepJournal>, events: EventBus) -> Self {
        Self {
            run_id,
            journal,
            events,
        }
    }
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    fn run_id(&self) -> RunId {
        self.run_id
    }

    async fn run_step<'s>(&self, name: &str, step: StepFuture<'s>) -> Result<Value, RunError> {
        if let Some(value) = self
            .journal
            .load(self.run_id, JournalEntryKind::Step, name)
            .await?
        {
            tracing::trace!(run_id = %self.run_id, step = %name, "Replaying recorded step");
            return Ok(value);
        }

        let value = step.await?;
        self.journal
            .record(self.run_id, JournalEntryKind::Step, name, &value)
            .await?;

        tracing::trace!(run_id = %self.run_id, step = %name, "Recorded step");
        Ok(value)
    }

    async fn await_event(&self, name: &str, timeout: Duration) -> Result<Value, RunError> {
        if let Some(payload) = self
            .journal
            .load(self.run_id, JournalEntryKind::Event, name)
            .await?
        {
            return Ok(payload);
        }

        let rx = self.events.listen(self.run_id, name).await;
        tracing::debug!(run_id = %self.run_id, event = %name, ?timeout, "Waiting for event");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => {
                self.journal
                    .record(self.run_id, JournalEntryKind::Event, name, &payload)
                    .await?;
                Ok(payload)
            }
            Ok(Err(_)) => Err(RunError::EventSourceClosed {
                event: name.to_string(),
            }),
            Err(_) => {
                self.events.forget(self.run_id, name).await;
                tracing::warn!(run_id = %self.run_id, event = %name, ?timeout, "Timed out waiting for event");
                Err(RunError::Timeout {
                    event: name.to_string(),
                    timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryStepJournal;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> LocalEngine {
        LocalEngine::new(
            RunId::new(),
            Arc::new(InMemoryStepJournal::new()),
            EventBus::new(),
        )
    }

    #[tokio::test]
    async fn test_step_runs_once_per_name() {
        let engine = engine();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = engine
                .run_step(
                    "relay-output-0",
                    async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(json!("done"))
                    }
                    .boxed(),
                )
                .await
                .unwrap();
            assert_eq!(value, json!("done"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_step_is_not_recorded() {
        let engine = engine();

        let result = engine
            .run_step("s", async { Err(RunError::workflow("boom")) }.boxed())
            .await;
        assert!(matches!(result, Err(RunError::Workflow(_))));

        let value = engine
            .run_step("s", async { Ok(json!(7)) }.boxed())
            .await
            .unwrap();
        assert_eq!(value, json!(7));
    }

    #[tokio::test]
    async fn test_event_payload_is_recorded_for_replay() {
        let journal = Arc::new(InMemoryStepJournal::new());
        let events = EventBus::new();
        let run_id = RunId::new();
        let engine = LocalEngine::new(run_id, journal.clone(), events.clone());

        events.submit(run_id, "relay-input-0", json!({"input": "Ada"})).await;
        let first = engine
            .await_event("relay-input-0", Duration::from_secs(1))
            .await
            .unwrap();

        let replay = LocalEngine::new(run_id, journal, EventBus::new());
        let second = replay
            .await_event("relay-input-0", Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_event_times_out() {
        let engine = engine();

        let result = engine
            .await_event("relay-input-0", Duration::from_secs(300))
            .await;

        match result {
            Err(RunError::Timeout { event, timeout }) => {
                assert_eq!(event, "relay-input-0");
                assert_eq!(timeout, Duration::from_secs(300));
            }
            other => unreachable!("expected timeout, got {other:?}"),
        }
    }
}
