use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::protocol::{Message, ProtocolError};
use crate::types::RunId;

use super::actor::{RunActorError, RunActorHandle, spawn_run_actor};
use super::store::{MessageStore, MessageStoreError, RunSummary};
use super::subscription::Subscription;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Run not found: {run_id}")]
    UnknownRun { run_id: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Message store error: {0}")]
    Store(#[from] MessageStoreError),

    #[error("Channel closed")]
    ChannelClosed,
}

impl CoordinatorError {
    fn unknown_run(run_id: RunId) -> Self {
        Self::UnknownRun {
            run_id: run_id.to_string(),
        }
    }
}

impl From<RunActorError> for CoordinatorError {
    fn from(error: RunActorError) -> Self {
        match error {
            RunActorError::Store(MessageStoreError::RunNotFound { run_id }) => {
                Self::UnknownRun { run_id }
            }
            RunActorError::Store(e) => Self::Store(e),
            RunActorError::Protocol(e) => Self::Protocol(e),
            RunActorError::ChannelClosed => Self::ChannelClosed,
        }
    }
}

pub(crate) enum CoordinatorCmd {
    CreateRun {
        reply: oneshot::Sender<Result<RunId, CoordinatorError>>,
    },
    ResolveRun {
        run_id: RunId,
        reply: oneshot::Sender<Result<RunActorHandle, CoordinatorError>>,
    },
    SuspendRun {
        run_id: RunId,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    DeleteRun {
        run_id: RunId,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    IsRunActive {
        run_id: RunId,
        reply: oneshot::Sender<bool>,
    },
    ListActiveRuns {
        reply: oneshot::Sender<Vec<RunId>>,
    },
    ListRuns {
        reply: oneshot::Sender<Result<Vec<RunSummary>, CoordinatorError>>,
    },
    RunExists {
        run_id: RunId,
        reply: oneshot::Sender<Result<bool, CoordinatorError>>,
    },
    Shutdown,
}

/// Routing table from run id to that run's actor.
///
/// Actors are spawned lazily by replaying the persisted log, so a run
/// survives process restarts and suspension. Only incomplete runs stay in
/// the table; a run is evicted as soon as its terminal marker is stored.
struct Coordinator {
    runs: HashMap<RunId, RunActorHandle>,
    store: Arc<dyn MessageStore>,
    finished_tx: mpsc::UnboundedSender<RunId>,
    finished_rx: mpsc::UnboundedReceiver<RunId>,
}

impl Coordinator {
    fn new(store: Arc<dyn MessageStore>) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            runs: HashMap::new(),
            store,
            finished_tx,
            finished_rx,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<CoordinatorCmd>) {
        loop {
            let cmd = tokio::select! {
                biased;

                Some(run_id) = self.finished_rx.recv() => {
                    self.evict(run_id);
                    continue;
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };

            match cmd {
                CoordinatorCmd::CreateRun { reply } => {
                    let result = self.create_run().await;
                    let _ = reply.send(result);
                }
                CoordinatorCmd::ResolveRun { run_id, reply } => {
                    let result = self.resolve_run(run_id).await;
                    let _ = reply.send(result);
                }
                CoordinatorCmd::SuspendRun { run_id, reply } => {
                    let result = self.suspend_run(run_id).await;
                    let _ = reply.send(result);
                }
                CoordinatorCmd::DeleteRun { run_id, reply } => {
                    let result = self.delete_run(run_id).await;
                    let _ = reply.send(result);
                }
                CoordinatorCmd::IsRunActive { run_id, reply } => {
                    let is_active = self
                        .runs
                        .get(&run_id)
                        .is_some_and(|handle| !handle.is_closed());
                    let _ = reply.send(is_active);
                }
                CoordinatorCmd::ListActiveRuns { reply } => {
                    let runs: Vec<RunId> = self
                        .runs
                        .iter()
                        .filter(|(_, handle)| !handle.is_closed())
                        .map(|(run_id, _)| *run_id)
                        .collect();
                    let _ = reply.send(runs);
                }
                CoordinatorCmd::ListRuns { reply } => {
                    let result = self.store.list_runs().await.map_err(CoordinatorError::from);
                    let _ = reply.send(result);
                }
                CoordinatorCmd::RunExists { run_id, reply } => {
                    let result = self
                        .store
                        .run_exists(run_id)
                        .await
                        .map_err(CoordinatorError::from);
                    let _ = reply.send(result);
                }
                CoordinatorCmd::Shutdown => {
                    self.shutdown_all();
                    break;
                }
            }
        }

        tracing::info!("Coordinator stopped");
    }

    /// Drops the table's handle to a completed run. The actor stops once
    /// in-flight callers release their clones.
    fn evict(&mut self, run_id: RunId) {
        if self.runs.remove(&run_id).is_some() {
            tracing::debug!(
                run_id = %run_id,
                active_runs = self.runs.len(),
                "Evicted completed run"
            );
        }
    }

    async fn create_run(&mut self) -> Result<RunId, CoordinatorError> {
        let run_id = RunId::new();
        self.store.create_run(run_id).await?;

        let handle = spawn_run_actor(
            run_id,
            Vec::new(),
            self.store.clone(),
            self.finished_tx.clone(),
        );
        self.runs.insert(run_id, handle);

        tracing::info!(run_id = %run_id, "Created run");

        Ok(run_id)
    }

    async fn resolve_run(&mut self, run_id: RunId) -> Result<RunActorHandle, CoordinatorError> {
        if let Some(handle) = self.runs.get(&run_id) {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
        }

        if !self.store.run_exists(run_id).await? {
            return Err(CoordinatorError::unknown_run(run_id));
        }

        let history: Vec<Message> = self
            .store
            .load_messages(run_id)
            .await?
            .into_iter()
            .map(|(_, message)| message)
            .collect();
        let message_count = history.len();
        let complete = history.iter().any(Message::is_terminal);

        let handle = spawn_run_actor(
            run_id,
            history,
            self.store.clone(),
            self.finished_tx.clone(),
        );

        if complete {
            // Served to this caller only; the actor stops with its last handle.
            tracing::debug!(run_id = %run_id, message_count, "Loaded completed run");
        } else {
            self.runs.insert(run_id, handle.clone());
            tracing::info!(run_id = %run_id, message_count, "Resumed run");
        }

        Ok(handle)
    }

    async fn suspend_run(&mut self, run_id: RunId) -> Result<(), CoordinatorError> {
        if let Some(handle) = self.runs.remove(&run_id) {
            let _ = handle.suspend().await;
            tracing::info!(run_id = %run_id, "Suspended run");
        }
        Ok(())
    }

    async fn delete_run(&mut self, run_id: RunId) -> Result<(), CoordinatorError> {
        if let Some(handle) = self.runs.remove(&run_id) {
            handle.shutdown();
        }

        self.store.delete_run(run_id).await.map_err(|e| match e {
            MessageStoreError::RunNotFound { .. } => CoordinatorError::unknown_run(run_id),
            other => other.into(),
        })?;

        tracing::info!(run_id = %run_id, "Deleted run");

        Ok(())
    }

    fn shutdown_all(&mut self) {
        for (run_id, handle) in self.runs.drain() {
            handle.shutdown();
            tracing::debug!(run_id = %run_id, "Shutting down run");
        }
    }
}

/// Client side of the coordinator. Run-scoped calls go straight to the
/// run's actor once it has been resolved, so busy runs never queue behind
/// one another.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorCmd>,
}

impl CoordinatorHandle {
    pub async fn create_run(&self) -> Result<RunId, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordinatorCmd::CreateRun { reply: reply_tx })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    async fn resolve_run(&self, run_id: RunId) -> Result<RunActorHandle, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordinatorCmd::ResolveRun {
                run_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    /// Validates, persists and fans out `message`, returning its sequence
    /// number once it is durably stored.
    pub async fn append(&self, run_id: RunId, message: Message) -> Result<u64, CoordinatorError> {
        let handle = self.resolve_run(run_id).await?;
        Ok(handle.append(message).await?)
    }

    pub async fn subscribe(&self, run_id: RunId) -> Result<Subscription, CoordinatorError> {
        let handle = self.resolve_run(run_id).await?;
        Ok(handle.subscribe().await?)
    }

    pub async fn history(&self, run_id: RunId) -> Result<Vec<Message>, CoordinatorError> {
        let handle = self.resolve_run(run_id).await?;
        Ok(handle.history().await?)
    }

    pub async fn resume_run(&self, run_id: RunId) -> Result<(), CoordinatorError> {
        self.resolve_run(run_id).await.map(|_| ())
    }

    pub async fn suspend_run(&self, run_id: RunId) -> Result<(), CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordinatorCmd::SuspendRun {
                run_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    pub async fn delete_run(&self, run_id: RunId) -> Result<(), CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordinatorCmd::DeleteRun {
                run_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    pub async fn is_run_active(&self, run_id: RunId) -> Result<bool, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordinatorCmd::IsRunActive {
                run_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    pub async fn list_active_runs(&self) -> Result<Vec<RunId>, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordinatorCmd::ListActiveRuns { reply: reply_tx })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    pub async fn list_runs(&self) -> Result<Vec<RunSummary>, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordinatorCmd::ListRuns { reply: reply_tx })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    pub async fn run_exists(&self, run_id: RunId) -> Result<bool, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordinatorCmd::RunExists {
                run_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    pub fn shutdown(&self) {
        let _ = self.tx.try_send(CoordinatorCmd::Shutdown);
    }
}

pub struct CoordinatorService {
    pub handle: CoordinatorHandle,
    task: JoinHandle<()>,
}

impl CoordinatorService {
    pub fn spawn(store: Arc<dyn MessageStore>) -> Self {
        let (tx, rx) = mpsc::channel(64);

        let coordinator = Coordinator::new(store);
        let task = tokio::spawn(coordinator.run(rx));

        let handle = CoordinatorHandle { tx };

        Self { handle, task }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    pub async fn shutdown(self) {
        self.handle.shutdown();
        let _ = self.task.await;
    }
}
