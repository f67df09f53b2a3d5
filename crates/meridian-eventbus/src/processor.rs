//! Event dispatch.
//!
//! The processor invokes every handler registered for an event's type in
//! order. A failing handler never stops the handlers after it: each failure
//! is passed to the [`ErrorHandler`] and collected in the
//! [`DispatchReport`]. Once dispatch completes the event is marked processed,
//! whether or not handlers failed; "processed" records delivery, not success.

use std::sync::Arc;

use meridian_core::error::DomainError;
use meridian_core::event::DomainEvent;
use meridian_core::log::Acknowledgment;
use meridian_core::repository::EventStore;
use uuid::Uuid;

use crate::error_handler::ErrorHandler;
use crate::registry::HandlerRegistry;

/// Outcome of dispatching one event.
#[derive(Debug)]
pub struct DispatchReport {
    /// Dispatched event.
    pub event_id: Uuid,
    /// Its event type.
    pub event_type: &'static str,
    /// Handlers that completed successfully.
    pub succeeded: usize,
    /// Failures of the handlers that did not.
    pub failures: Vec<DomainError>,
    /// Whether the store recorded the event as processed.
    pub marked_processed: bool,
    /// Failure to mark the event processed, if any.
    pub mark_error: Option<DomainError>,
}

impl DispatchReport {
    /// True when every handler succeeded and marking did not fail.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.mark_error.is_none()
    }

    /// Number of handlers invoked.
    #[must_use]
    pub fn invoked(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    fn into_error(self) -> DomainError {
        let failed = self.failures.len();
        let invoked = self.invoked();
        if let Some(error) = self.mark_error {
            return error;
        }
        match self.failures.into_iter().next() {
            Some(first) if failed == 1 => first,
            Some(first) => DomainError::Handler {
                handler: format!("{failed} of {invoked} handlers"),
                event_type: self.event_type.to_owned(),
                message: first.to_string(),
            },
            None => DomainError::Infrastructure(format!(
                "dispatch of {} reported no failure",
                self.event_id
            )),
        }
    }
}

/// Dispatches events to registered handlers and marks them processed.
pub struct EventProcessor {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn EventStore>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl std::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl EventProcessor {
    /// Creates a processor over a frozen registry.
    #[must_use]
    pub fn new(
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn EventStore>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            registry,
            store,
            error_handler,
        }
    }

    /// The registry this processor dispatches from.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Dispatches an event published in this process.
    ///
    /// Never fails: handler failures go to the error handler and are listed
    /// in the report.
    pub async fn handle_local_event(&self, event: &DomainEvent) -> DispatchReport {
        self.dispatch(event).await
    }

    /// Re-entrant dispatch with the same semantics as
    /// [`handle_local_event`](Self::handle_local_event), for redelivery and
    /// replay tooling.
    pub async fn process_event(&self, event: &DomainEvent) -> DispatchReport {
        self.dispatch(event).await
    }

    /// Dispatches an event received from the distributed log.
    ///
    /// Acknowledges exactly once when dispatch succeeded. On any failure the
    /// delivery is left unacknowledged so the log redelivers it.
    ///
    /// # Errors
    ///
    /// Returns the handler or store failure that prevented acknowledgement,
    /// or the acknowledgement failure itself.
    pub async fn handle_distributed_event(
        &self,
        event: &DomainEvent,
        ack: Box<dyn Acknowledgment>,
    ) -> Result<DispatchReport, DomainError> {
        let report = self.dispatch(event).await;
        if !report.is_success() {
            tracing::warn!(
                event_id = %event.event_id,
                event_type = event.event_type(),
                failures = report.failures.len(),
                "distributed dispatch failed, leaving delivery unacknowledged"
            );
            return Err(report.into_error());
        }
        ack.acknowledge().await?;
        tracing::debug!(
            event_id = %event.event_id,
            event_type = event.event_type(),
            "distributed event acknowledged"
        );
        Ok(report)
    }

    async fn dispatch(&self, event: &DomainEvent) -> DispatchReport {
        let event_type = event.event_type();
        let mut succeeded = 0;
        let mut failures = Vec::new();

        for invocation in self.registry.handlers_for(event_type) {
            match invocation.invoke(event).await {
                Ok(()) => succeeded += 1,
                Err(error) => {
                    tracing::warn!(
                        event_id = %event.event_id,
                        event_type,
                        handler = invocation.name(),
                        error = %error,
                        "handler failed, continuing with remaining handlers"
                    );
                    self.error_handler.handle_error(event, &error).await;
                    failures.push(error);
                }
            }
        }

        let (marked_processed, mark_error) =
            match self.store.mark_as_processed(event.event_id).await {
                Ok(()) => (true, None),
                Err(DomainError::EventNotFound(id)) => {
                    // Delivered from another process' store; nothing to mark here.
                    tracing::warn!(event_id = %id, "dispatched event is not in the local store");
                    (false, None)
                }
                Err(error) => {
                    tracing::error!(
                        event_id = %event.event_id,
                        error = %error,
                        "failed to mark event as processed"
                    );
                    self.error_handler.handle_error(event, &error).await;
                    (false, Some(error))
                }
            };

        tracing::debug!(
            event_id = %event.event_id,
            event_type,
            succeeded,
            failed = failures.len(),
            marked_processed,
            "dispatch complete"
        );

        DispatchReport {
            event_id: event.event_id,
            event_type,
            succeeded,
            failures,
            marked_processed,
            mark_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use meridian_core::error::DomainError;
    use meridian_core::event::{ASSET_CREATED_EVENT_TYPE, DomainEvent};
    use meridian_core::repository::EventStore;
    use meridian_event_store::InMemoryEventStore;
    use meridian_test_support::{
        AckCounter, FailingEventStore, FixedClock, asset_created, fixed_time,
    };

    use super::*;
    use crate::error_handler::{ErrorHandler, LoggingErrorHandler};
    use crate::registry::{HandlerRegistry, handler_fn};

    /// Error handler that records every failure it receives.
    #[derive(Debug, Default)]
    struct RecordingErrorHandler {
        errors: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ErrorHandler for RecordingErrorHandler {
        async fn handle_error(&self, _event: &DomainEvent, error: &DomainError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    fn tracking_handler(
        registry: &mut HandlerRegistry,
        name: &'static str,
        order: i32,
        calls: &Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    ) {
        let calls = Arc::clone(calls);
        registry.register(
            ASSET_CREATED_EVENT_TYPE,
            order,
            handler_fn(name, move |_| {
                calls.lock().unwrap().push(name);
                if fail {
                    Err(DomainError::Validation(format!("{name} rejected event")))
                } else {
                    Ok(())
                }
            }),
        );
    }

    async fn stored_event(store: &InMemoryEventStore) -> DomainEvent {
        let event = asset_created("AST-001", &FixedClock(fixed_time()));
        store.store(&event).await.unwrap()
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_later_handlers() {
        // Arrange
        let store = Arc::new(InMemoryEventStore::new());
        let event = stored_event(&store).await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        tracking_handler(&mut registry, "first", 0, &calls, true);
        tracking_handler(&mut registry, "second", 1, &calls, false);
        let errors = Arc::new(RecordingErrorHandler::default());
        let processor = EventProcessor::new(Arc::new(registry), store.clone(), errors.clone());

        // Act
        let report = processor.handle_local_event(&event).await;

        // Assert
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(errors.errors.lock().unwrap().len(), 1);
        assert!(errors.errors.lock().unwrap()[0].contains("first rejected event"));
    }

    #[tokio::test]
    async fn test_event_is_marked_processed_even_when_a_handler_fails() {
        let store = Arc::new(InMemoryEventStore::new());
        let event = stored_event(&store).await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        tracking_handler(&mut registry, "only", 0, &calls, true);
        let processor =
            EventProcessor::new(Arc::new(registry), store.clone(), Arc::new(LoggingErrorHandler));

        let report = processor.handle_local_event(&event).await;

        assert!(report.marked_processed);
        assert!(!report.is_success());
        let stored = store.find_by_event_id(event.event_id).await.unwrap().unwrap();
        assert!(stored.processed);
    }

    #[tokio::test]
    async fn test_event_without_handlers_is_still_marked_processed() {
        let store = Arc::new(InMemoryEventStore::new());
        let event = stored_event(&store).await;
        let processor = EventProcessor::new(
            Arc::new(HandlerRegistry::new()),
            store.clone(),
            Arc::new(LoggingErrorHandler),
        );

        let report = processor.process_event(&event).await;

        assert_eq!(report.invoked(), 0);
        assert!(report.is_success());
        assert!(
            store
                .find_by_event_id(event.event_id)
                .await
                .unwrap()
                .unwrap()
                .processed
        );
    }

    #[tokio::test]
    async fn test_distributed_success_acknowledges_exactly_once() {
        // Arrange
        let store = Arc::new(InMemoryEventStore::new());
        let event = stored_event(&store).await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        tracking_handler(&mut registry, "projection", 0, &calls, false);
        let processor =
            EventProcessor::new(Arc::new(registry), store.clone(), Arc::new(LoggingErrorHandler));
        let acks = AckCounter::new();

        // Act
        let result = processor.handle_distributed_event(&event, acks.handle()).await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(acks.count(), 1);
    }

    #[tokio::test]
    async fn test_distributed_failure_is_not_acknowledged() {
        let store = Arc::new(InMemoryEventStore::new());
        let event = stored_event(&store).await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        tracking_handler(&mut registry, "projection", 0, &calls, true);
        let processor =
            EventProcessor::new(Arc::new(registry), store.clone(), Arc::new(LoggingErrorHandler));
        let acks = AckCounter::new();

        let result = processor.handle_distributed_event(&event, acks.handle()).await;

        assert!(matches!(result, Err(DomainError::Handler { .. })));
        assert_eq!(acks.count(), 0);
    }

    #[tokio::test]
    async fn test_distributed_event_from_other_store_is_acknowledged() {
        let store = Arc::new(InMemoryEventStore::new());
        let foreign = asset_created("AST-404", &FixedClock(fixed_time()));
        let processor = EventProcessor::new(
            Arc::new(HandlerRegistry::new()),
            store,
            Arc::new(LoggingErrorHandler),
        );
        let acks = AckCounter::new();

        let report = processor
            .handle_distributed_event(&foreign, acks.handle())
            .await
            .unwrap();

        assert!(!report.marked_processed);
        assert_eq!(acks.count(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_on_mark_blocks_acknowledgement() {
        let processor = EventProcessor::new(
            Arc::new(HandlerRegistry::new()),
            Arc::new(FailingEventStore),
            Arc::new(LoggingErrorHandler),
        );
        let event = asset_created("AST-001", &FixedClock(fixed_time()));
        let acks = AckCounter::new();

        let result = processor.handle_distributed_event(&event, acks.handle()).await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
        assert_eq!(acks.count(), 0);
    }
}
