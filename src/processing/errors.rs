use thiserror::Error;

/// Errors surfaced while processing a score event.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The event payload is unusable (unparseable, missing or inverted
    /// timestamps). Never retried; the consumer routes these to the
    /// dead-letter path.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The datastore failed mid unit-of-work. Safe to retry by redelivering
    /// the same event: nothing was committed.
    #[error("store failure: {0}")]
    Store(String),

    /// A processor detected an internally inconsistent aggregate, e.g. a
    /// revert that would drive a counter negative. Fatal for this event
    /// only.
    #[error("rule violation: {0}")]
    RuleViolation(String),
}

impl ProcessingError {
    /// Whether redelivering the event can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessingError::Store(_))
    }
}
