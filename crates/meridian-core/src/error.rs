//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type shared by the event backbone.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No stored event carries the given identifier.
    #[error("event not found: {0}")]
    EventNotFound(Uuid),

    /// The event cannot be persisted as a concrete record.
    #[error("invalid event kind: {0}")]
    InvalidEventKind(String),

    /// An event with the same identifier has already been appended.
    #[error("duplicate event: {0}")]
    DuplicateEvent(Uuid),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// The event could not be durably recorded, so it was not published.
    #[error("could not publish event {event_id}: {reason}")]
    Publishing {
        /// The event that failed to publish.
        event_id: Uuid,
        /// Underlying failure.
        reason: String,
    },

    /// A registered handler failed while processing an event.
    #[error("handler {handler} failed on {event_type}: {message}")]
    Handler {
        /// Name of the failing handler.
        handler: String,
        /// Event type being dispatched.
        event_type: String,
        /// Failure description.
        message: String,
    },

    /// Sending to or committing on the distributed log failed.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Encoding or decoding an event failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
