use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{Message, ProtocolError};
use crate::types::RunId;

use super::store::{MessageStore, MessageStoreError};
use super::subscription::{Subscription, UnsubscribeSignal};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

pub(crate) enum RunCmd {
    Append {
        message: Message,
        reply: oneshot::Sender<Result<u64, RunActorError>>,
    },
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },
    History {
        reply: oneshot::Sender<Vec<Message>>,
    },
    Suspend {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

#[derive(Debug, Error)]
pub enum RunActorError {
    #[error("Message store error: {0}")]
    Store(#[from] MessageStoreError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Address of one run's actor. Cheap to clone; every clone feeds the same
/// command loop.
#[derive(Clone)]
pub struct RunActorHandle {
    run_id: RunId,
    cmd_tx: mpsc::Sender<RunCmd>,
}

impl RunActorHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    pub async fn append(&self, message: Message) -> Result<u64, RunActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(RunCmd::Append {
                message,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RunActorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RunActorError::ChannelClosed)?
    }

    pub async fn subscribe(&self) -> Result<Subscription, RunActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(RunCmd::Subscribe { reply: reply_tx })
            .await
            .map_err(|_| RunActorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RunActorError::ChannelClosed)
    }

    pub async fn history(&self) -> Result<Vec<Message>, RunActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(RunCmd::History { reply: reply_tx })
            .await
            .map_err(|_| RunActorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RunActorError::ChannelClosed)
    }

    pub async fn suspend(&self) -> Result<(), RunActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(RunCmd::Suspend { reply: reply_tx })
            .await
            .map_err(|_| RunActorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RunActorError::ChannelClosed)
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.try_send(RunCmd::Shutdown);
    }
}

struct RunActor {
    run_id: RunId,
    history: Vec<Message>,
    complete: bool,
    store: Arc<dyn MessageStore>,
    finished_tx: mpsc::UnboundedSender<RunId>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Message>>,
    next_subscriber_id: u64,
    unsubscribe_tx: mpsc::UnboundedSender<UnsubscribeSignal>,
    unsubscribe_rx: mpsc::UnboundedReceiver<UnsubscribeSignal>,
}

impl RunActor {
    fn new(
        run_id: RunId,
        history: Vec<Message>,
        store: Arc<dyn MessageStore>,
        finished_tx: mpsc::UnboundedSender<RunId>,
    ) -> Self {
        let complete = history.iter().any(Message::is_terminal);
        let (unsubscribe_tx, unsubscribe_rx) = mpsc::unbounded_channel();

        Self {
            run_id,
            history,
            complete,
            store,
            finished_tx,
            subscribers: HashMap::new(),
            next_subscriber_id: 0,
            unsubscribe_tx,
            unsubscribe_rx,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<RunCmd>) {
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    // Every handle is gone; nobody can reach this run again.
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        RunCmd::Append { message, reply } => {
                            let result = self.append(message).await;
                            let _ = reply.send(result);
                        }
                        RunCmd::Subscribe { reply } => {
                            let subscription = self.create_subscription();
                            let _ = reply.send(subscription);
                        }
                        RunCmd::History { reply } => {
                            let _ = reply.send(self.history.clone());
                        }
                        RunCmd::Suspend { reply } => {
                            let _ = reply.send(());
                            break;
                        }
                        RunCmd::Shutdown => break,
                    }
                }

                Some(UnsubscribeSignal(subscriber_id)) = self.unsubscribe_rx.recv() => {
                    self.subscribers.remove(&subscriber_id);
                    tracing::debug!(
                        run_id = %self.run_id,
                        subscriber_count = self.subscribers.len(),
                        "Subscriber disconnected"
                    );
                }
            }
        }

        tracing::debug!(run_id = %self.run_id, "Run actor stopped");
    }

    async fn append(&mut self, message: Message) -> Result<u64, RunActorError> {
        if self.complete {
            return Err(ProtocolError::RunComplete {
                run_id: self.run_id.to_string(),
            }
            .into());
        }
        message.validate()?;

        let seq = match self.store.append(self.run_id, &message).await {
            Ok(seq) => seq,
            Err(e) => {
                tracing::error!(
                    target: "core.message_store",
                    run_id = %self.run_id,
                    message_id = %message.id(),
                    error = %e,
                    "Failed to persist message"
                );
                return Err(e.into());
            }
        };

        let terminal = message.is_terminal();
        self.broadcast(&message);
        self.history.push(message);

        if terminal {
            self.complete = true;
            // Dropping the senders closes every live channel after the
            // terminal marker has been queued.
            self.subscribers.clear();
            let _ = self.finished_tx.send(self.run_id);
            tracing::info!(run_id = %self.run_id, seq, "Run completed");
        }

        Ok(seq)
    }

    fn broadcast(&mut self, message: &Message) {
        let run_id = self.run_id;
        self.subscribers
            .retain(|subscriber_id, tx| match tx.send(message.clone()) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!(
                        run_id = %run_id,
                        subscriber_id,
                        "Pruning closed subscriber"
                    );
                    false
                }
            });
    }

    fn create_subscription(&mut self) -> Subscription {
        let subscriber_id = self.next_subscriber_id;
        self.next_subscriber_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        if !self.complete {
            self.subscribers.insert(subscriber_id, tx);
        }

        tracing::debug!(
            run_id = %self.run_id,
            subscriber_count = self.subscribers.len(),
            history_len = self.history.len(),
            "New subscriber"
        );

        Subscription::new(
            self.run_id,
            self.history.clone(),
            rx,
            subscriber_id,
            self.unsubscribe_tx.clone(),
        )
    }
}

/// Starts the actor for `run_id` seeded with the persisted `history`.
///
/// The actor reports its run id on `finished_tx` once the terminal marker is
/// stored, and stops when its last handle is dropped.
pub(crate) fn spawn_run_actor(
    run_id: RunId,
    history: Vec<Message>,
    store: Arc<dyn MessageStore>,
    finished_tx: mpsc::UnboundedSender<RunId>,
) -> RunActorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

    let actor = RunActor::new(run_id, history, store, finished_tx);
    tokio::spawn(actor.run(cmd_rx));

    RunActorHandle { run_id, cmd_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::store::InMemoryMessageStore;

    async fn spawn_fresh() -> RunActorHandle {
        spawn_reporting().await.0
    }

    async fn spawn_reporting() -> (RunActorHandle, mpsc::UnboundedReceiver<RunId>) {
        let store = Arc::new(InMemoryMessageStore::new());
        let run_id = RunId::new();
        store.create_run(run_id).await.unwrap();
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        (
            spawn_run_actor(run_id, Vec::new(), store, finished_tx),
            finished_rx,
        )
    }

    #[tokio::test]
    async fn test_live_subscriber_sees_appends_in_order() {
        let handle = spawn_fresh().await;
        let mut subscription = handle.subscribe().await.unwrap();
        assert!(subscription.history.is_empty());

        handle.append(Message::log("a", "one")).await.unwrap();
        handle.append(Message::log("b", "two")).await.unwrap();

        assert_eq!(subscription.recv().await.unwrap().id(), "a");
        assert_eq!(subscription.recv().await.unwrap().id(), "b");
    }

    #[tokio::test]
    async fn test_completion_closes_live_channel() {
        let handle = spawn_fresh().await;
        let mut subscription = handle.subscribe().await.unwrap();

        handle
            .append(Message::workflow_complete("relay-workflow-complete"))
            .await
            .unwrap();

        assert!(subscription.recv().await.unwrap().is_terminal());
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_append_after_completion_is_rejected() {
        let handle = spawn_fresh().await;
        handle.append(Message::workflow_complete("done")).await.unwrap();

        let result = handle.append(Message::log("late", "too late")).await;
        assert!(matches!(
            result,
            Err(RunActorError::Protocol(ProtocolError::RunComplete { .. }))
        ));
        assert_eq!(handle.history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribing_to_completed_run_yields_closed_channel() {
        let handle = spawn_fresh().await;
        handle.append(Message::log("a", "one")).await.unwrap();
        handle.append(Message::workflow_complete("done")).await.unwrap();

        let mut subscription = handle.subscribe().await.unwrap();
        assert_eq!(subscription.history.len(), 2);
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_message_is_not_stored() {
        let handle = spawn_fresh().await;
        let result = handle.append(Message::log("", "no id")).await;
        assert!(matches!(
            result,
            Err(RunActorError::Protocol(ProtocolError::EmptyId))
        ));
        assert!(handle.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_append() {
        let handle = spawn_fresh().await;
        let dropped = handle.subscribe().await.unwrap();
        let mut kept = handle.subscribe().await.unwrap();
        drop(dropped);

        for i in 0..10 {
            handle
                .append(Message::log(format!("m{i}"), "x"))
                .await
                .unwrap();
        }

        for i in 0..10 {
            assert_eq!(kept.recv().await.unwrap().id(), format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn test_suspend_stops_actor() {
        let handle = spawn_fresh().await;
        let mut subscription = handle.subscribe().await.unwrap();

        handle.suspend().await.unwrap();

        assert!(subscription.recv().await.is_none());
        assert!(matches!(
            handle.append(Message::log("a", "b")).await,
            Err(RunActorError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_completion_is_reported_once() {
        let (handle, mut finished) = spawn_reporting().await;

        handle.append(Message::log("a", "one")).await.unwrap();
        assert!(finished.try_recv().is_err());

        handle.append(Message::workflow_complete("done")).await.unwrap();
        assert_eq!(finished.try_recv().unwrap(), handle.run_id());
        assert!(finished.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_actor_stops_when_last_handle_dropped() {
        let handle = spawn_fresh().await;
        let mut subscription = handle.subscribe().await.unwrap();

        drop(handle);

        assert!(subscription.recv().await.is_none());
    }
}
