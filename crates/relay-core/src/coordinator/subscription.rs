use futures::Stream;
use tokio::sync::mpsc;

use crate::protocol::Message;
use crate::types::RunId;

/// An observer attached to one run.
///
/// `history` holds every message appended before the subscription was
/// created; the live receiver yields everything appended afterwards. The
/// receiver ends once `workflow_complete` has been delivered or the run's
/// actor stops.
pub struct Subscription {
    pub run_id: RunId,
    pub history: Vec<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    subscriber_id: u64,
    unsubscribe_tx: mpsc::UnboundedSender<UnsubscribeSignal>,
}

pub(crate) struct UnsubscribeSignal(pub u64);

impl Subscription {
    pub(crate) fn new(
        run_id: RunId,
        history: Vec<Message>,
        rx: mpsc::UnboundedReceiver<Message>,
        subscriber_id: u64,
        unsubscribe_tx: mpsc::UnboundedSender<UnsubscribeSignal>,
    ) -> Self {
        Self {
            run_id,
            history,
            rx,
            subscriber_id,
            unsubscribe_tx,
        }
    }

    /// Next live message, or `None` once the channel has closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn take_history(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.history)
    }

    /// History followed by live messages, as a single stream.
    pub fn into_stream(mut self) -> impl Stream<Item = Message> + Send + 'static {
        async_stream::stream! {
            for message in self.take_history() {
                yield message;
            }
            while let Some(message) = self.recv().await {
                yield message;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self
            .unsubscribe_tx
            .send(UnsubscribeSignal(self.subscriber_id));
    }
}
