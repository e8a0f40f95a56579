// Queue transport boundary
//
// The transport guarantees at-least-once delivery of opaque payloads and
// nothing more: no ordering, and possible redelivery of anything. The
// pipeline's dedup/version design makes that safe, so the consumer here
// stays simple.

pub use consumer::{ConsumerConfig, ScoreConsumer};
pub use envelope::ScoreEnvelope;
pub use memory::InMemoryScoreQueue;

mod consumer;
mod envelope;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,
}

/// The narrow interface the consumer needs from the transport.
#[async_trait]
pub trait ScoreQueue: Send + Sync {
    /// Next envelope, or `None` once the queue has shut down.
    async fn poll(&self) -> Option<ScoreEnvelope>;

    async fn publish(&self, envelope: ScoreEnvelope) -> Result<(), QueueError>;

    /// Puts an envelope back for redelivery after a transient failure.
    async fn requeue(&self, envelope: ScoreEnvelope) -> Result<(), QueueError>;
}
