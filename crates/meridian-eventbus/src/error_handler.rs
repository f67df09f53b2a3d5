//! Failure sink for event dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use meridian_core::error::DomainError;
use meridian_core::event::DomainEvent;
use meridian_core::repository::EventStore;

/// Receives every handler failure the processor isolates.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Reports one failure raised while dispatching `event`.
    async fn handle_error(&self, event: &DomainEvent, error: &DomainError);
}

/// Logs failures and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

#[async_trait]
impl ErrorHandler for LoggingErrorHandler {
    async fn handle_error(&self, event: &DomainEvent, error: &DomainError) {
        tracing::error!(
            event_id = %event.event_id,
            event_type = event.event_type(),
            aggregate_id = %event.aggregate_id,
            error = %error,
            "event handler failed"
        );
    }
}

/// Logs failures and records them against the event's `retry_count`.
pub struct RetryCountingErrorHandler {
    store: Arc<dyn EventStore>,
}

impl RetryCountingErrorHandler {
    /// Creates a handler that increments retry counts in `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ErrorHandler for RetryCountingErrorHandler {
    async fn handle_error(&self, event: &DomainEvent, error: &DomainError) {
        match self.store.increment_retry_count(event.event_id).await {
            Ok(retry_count) => tracing::error!(
                event_id = %event.event_id,
                event_type = event.event_type(),
                aggregate_id = %event.aggregate_id,
                retry_count,
                error = %error,
                "event handler failed"
            ),
            Err(store_error) => tracing::error!(
                event_id = %event.event_id,
                event_type = event.event_type(),
                error = %error,
                store_error = %store_error,
                "event handler failed and retry count could not be recorded"
            ),
        }
    }
}
