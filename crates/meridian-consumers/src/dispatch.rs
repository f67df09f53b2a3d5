//! Distributed dispatch role.

use std::sync::Arc;

use async_trait::async_trait;
use meridian_core::error::DomainError;
use meridian_core::event::DomainEvent;
use meridian_core::log::Acknowledgment;
use meridian_eventbus::EventProcessor;
use meridian_log::MessageHandler;

/// Dispatches events received from the log to the handlers registered in
/// this process. Acknowledgement is left to the processor, which commits
/// only after every handler succeeded.
pub struct DistributedDispatch {
    processor: Arc<EventProcessor>,
}

impl DistributedDispatch {
    #[must_use]
    pub fn new(processor: Arc<EventProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl MessageHandler for DistributedDispatch {
    fn name(&self) -> &str {
        "distributed-dispatch"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), DomainError> {
        let report = self.processor.process_event(event).await;
        match report.failures.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }

    async fn handle_delivery(
        &self,
        event: &DomainEvent,
        ack: Box<dyn Acknowledgment>,
    ) -> Result<(), DomainError> {
        self.processor
            .handle_distributed_event(event, ack)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use meridian_core::event::ASSET_CREATED_EVENT_TYPE;
    use meridian_core::log::EventLog;
    use meridian_event_store::InMemoryEventStore;
    use meridian_eventbus::{HandlerRegistry, LoggingErrorHandler, handler_fn};
    use meridian_log::{ConsumerConfig, ConsumerRunner, InMemoryLog, PollOutcome};
    use meridian_test_support::{FixedClock, asset_created, fixed_time};

    use super::*;

    const TOPIC: &str = "meridian.audit.dev.business.v1";

    fn runner_with(log: &InMemoryLog, fail_first: usize, calls: Arc<AtomicUsize>) -> ConsumerRunner {
        let mut registry = HandlerRegistry::new();
        registry.register(
            ASSET_CREATED_EVENT_TYPE,
            0,
            handler_fn("projection", move |_| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call < fail_first {
                    Err(DomainError::Infrastructure("read model unavailable".into()))
                } else {
                    Ok(())
                }
            }),
        );
        let processor = Arc::new(EventProcessor::new(
            Arc::new(registry),
            Arc::new(InMemoryEventStore::new()),
            Arc::new(LoggingErrorHandler),
        ));
        ConsumerRunner::new(
            Arc::new(log.consumer("dispatch", vec![TOPIC.into()])),
            Arc::new(log.clone()),
            Arc::new(DistributedDispatch::new(processor)),
            ConsumerConfig::new("dispatch", vec![TOPIC.into()], "dlq")
                .with_poll_timeout(Duration::from_millis(10)),
        )
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_redelivered_and_then_committed() {
        // Arrange
        let log = InMemoryLog::new();
        let event = asset_created("AST-001", &FixedClock(fixed_time()));
        log.send(TOPIC, &event.aggregate_id, &event.to_json_bytes().unwrap())
            .await
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut runner = runner_with(&log, 1, calls.clone());

        // Act
        let first = runner.poll_once().await.unwrap();
        let lag_after_failure = log.lag("dispatch", TOPIC).unwrap();
        let second = runner.poll_once().await.unwrap();

        // Assert
        assert_eq!(first, PollOutcome::Failed { attempt: 1 });
        assert_eq!(lag_after_failure, 1);
        assert_eq!(second, PollOutcome::Processed);
        assert_eq!(log.lag("dispatch", TOPIC).unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
