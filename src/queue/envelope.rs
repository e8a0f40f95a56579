use serde_json::Value;
use uuid::Uuid;

use crate::processing::ProcessingError;
use crate::score::ScoreEvent;

/// One delivery off the transport: an opaque JSON payload plus a delivery
/// id for log correlation. The delivery id changes on redelivery; the
/// score id inside the payload is the stable dedup key.
#[derive(Debug, Clone)]
pub struct ScoreEnvelope {
    pub delivery_id: Uuid,
    pub payload: Value,
}

impl ScoreEnvelope {
    pub fn new(payload: Value) -> Self {
        Self {
            delivery_id: Uuid::new_v4(),
            payload,
        }
    }

    pub fn for_event(event: &ScoreEvent) -> Result<Self, ProcessingError> {
        let payload = serde_json::to_value(event)
            .map_err(|e| ProcessingError::MalformedEvent(e.to_string()))?;
        Ok(Self::new(payload))
    }

    /// Deserializes the payload into a [`ScoreEvent`]. Failures are
    /// [`ProcessingError::MalformedEvent`]: never retried, routed to the
    /// dead-letter path by the consumer.
    pub fn decode(&self) -> Result<ScoreEvent, ProcessingError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            ProcessingError::MalformedEvent(format!(
                "undeserializable payload (delivery {}): {e}",
                self.delivery_id
            ))
        })
    }
}
