use async_trait::async_trait;
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, Mutex};

use super::{QueueError, ScoreEnvelope, ScoreQueue};

/// In-memory queue for development and tests. Redelivery is a plain
/// re-send, so requeued envelopes arrive after anything already queued —
/// consistent with the transport contract of no ordering guarantees.
///
/// `close` stops intake; already-queued envelopes still drain, after which
/// `poll` returns `None` and consumers shut down.
pub struct InMemoryScoreQueue {
    sender: StdMutex<Option<mpsc::UnboundedSender<ScoreEnvelope>>>,
    receiver: Mutex<mpsc::UnboundedReceiver<ScoreEnvelope>>,
}

impl Default for InMemoryScoreQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryScoreQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: StdMutex::new(Some(sender)),
            receiver: Mutex::new(receiver),
        }
    }

    /// Closes the queue for new publishes. Buffered envelopes still drain.
    pub fn close(&self) {
        self.sender.lock().unwrap().take();
    }

    fn send(&self, envelope: ScoreEnvelope) -> Result<(), QueueError> {
        let sender = self.sender.lock().unwrap();
        match sender.as_ref() {
            Some(sender) => sender.send(envelope).map_err(|_| QueueError::Closed),
            None => Err(QueueError::Closed),
        }
    }
}

#[async_trait]
impl ScoreQueue for InMemoryScoreQueue {
    async fn poll(&self) -> Option<ScoreEnvelope> {
        self.receiver.lock().await.recv().await
    }

    async fn publish(&self, envelope: ScoreEnvelope) -> Result<(), QueueError> {
        self.send(envelope)
    }

    async fn requeue(&self, envelope: ScoreEnvelope) -> Result<(), QueueError> {
        self.send(envelope)
    }
}
