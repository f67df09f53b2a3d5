//! Consumer runtime.
//!
//! A [`ConsumerRunner`] owns one consumer and one [`MessageHandler`]. Each
//! record is decoded into a `DomainEvent` and handed to the handler together
//! with its acknowledgement. Handler failures leave the record uncommitted so
//! the log redelivers it; once a record has failed `max_attempts` times its
//! next delivery is sent to the dead-letter topic and committed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::clock::{Clock, SystemClock};
use meridian_core::error::DomainError;
use meridian_core::event::DomainEvent;
use meridian_core::log::{Acknowledgment, EventLog, LogConsumer, LogRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::ConsumerConfig;

/// One consumer role.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Role name used in logs and dead-letter records.
    fn name(&self) -> &str;

    /// Processes one event. Must be idempotent: the same event can arrive
    /// more than once.
    async fn handle(&self, event: &DomainEvent) -> Result<(), DomainError>;

    /// Processes one delivery and commits it on success.
    ///
    /// Roles that own acknowledgement themselves override this; an
    /// implementation must not acknowledge when it returns an error.
    async fn handle_delivery(
        &self,
        event: &DomainEvent,
        ack: Box<dyn Acknowledgment>,
    ) -> Result<(), DomainError> {
        self.handle(event).await?;
        ack.acknowledge().await
    }
}

/// Body of a record sent to the dead-letter topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub source_topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    /// Role that gave up on the record.
    pub handler: String,
    /// Last failure, or the decoding error.
    pub error: String,
    /// Handler attempts made before dead-lettering.
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
    /// Original payload, lossily decoded as UTF-8.
    pub payload: String,
}

/// What one [`ConsumerRunner::poll_once`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No record arrived within the poll timeout.
    Idle,
    /// The handler succeeded and the record was committed.
    Processed,
    /// The handler failed; the record stays uncommitted.
    Failed { attempt: u32 },
    /// The record was sent to the dead-letter topic and committed.
    DeadLettered { attempts: u32 },
}

type RecordPosition = (String, i32, i64);

/// Poll loop for one consumer role.
pub struct ConsumerRunner {
    consumer: Arc<dyn LogConsumer>,
    dead_letters: Arc<dyn EventLog>,
    handler: Arc<dyn MessageHandler>,
    config: ConsumerConfig,
    clock: Arc<dyn Clock>,
    attempts: HashMap<RecordPosition, (u32, String)>,
}

impl std::fmt::Debug for ConsumerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerRunner")
            .field("handler", &self.handler.name())
            .field("config", &self.config)
            .field("in_retry", &self.attempts.len())
            .finish_non_exhaustive()
    }
}

impl ConsumerRunner {
    #[must_use]
    pub fn new(
        consumer: Arc<dyn LogConsumer>,
        dead_letters: Arc<dyn EventLog>,
        handler: Arc<dyn MessageHandler>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            consumer,
            dead_letters,
            handler,
            config,
            clock: Arc::new(SystemClock),
            attempts: HashMap::new(),
        }
    }

    /// Replaces the clock used to stamp dead-letter records.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Runs until `shutdown` becomes `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            handler = self.handler.name(),
            group = %self.config.group_id,
            topics = ?self.config.topics,
            max_attempts = self.config.max_attempts,
            "starting consumer"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                outcome = self.poll_once() => outcome,
            };

            let pause = match outcome {
                Ok(PollOutcome::Failed { attempt }) => self.config.retry_delay(attempt),
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!(
                        handler = self.handler.name(),
                        error = %e,
                        "consumer poll failed, backing off"
                    );
                    self.config.error_backoff
                }
            };
            tokio::select! {
                _ = shutdown.changed() => {}
                () = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!(handler = self.handler.name(), "consumer stopped");
    }

    /// Polls and processes at most one record.
    ///
    /// # Errors
    ///
    /// Returns the poll error, or the dead-letter send or commit error. In
    /// both of the latter cases the record stays uncommitted.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, DomainError> {
        let Some(delivery) = self.consumer.poll(self.config.poll_timeout).await? else {
            return Ok(PollOutcome::Idle);
        };
        let (record, ack) = delivery.into_parts();
        let position: RecordPosition = (record.topic.clone(), record.partition, record.offset);

        let event = match DomainEvent::from_json_slice(&record.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "undecodable record, dead-lettering"
                );
                self.dead_letter(&record, e.to_string(), 0, ack).await?;
                return Ok(PollOutcome::DeadLettered { attempts: 0 });
            }
        };

        let exhausted = self
            .attempts
            .get(&position)
            .filter(|(attempts, _)| *attempts >= self.config.max_attempts)
            .cloned();
        if let Some((attempts, last_error)) = exhausted {
            tracing::error!(
                event_id = %event.event_id,
                handler = self.handler.name(),
                attempts,
                error = %last_error,
                "record exhausted its attempts, dead-lettering"
            );
            self.dead_letter(&record, last_error, attempts, ack).await?;
            self.attempts.remove(&position);
            return Ok(PollOutcome::DeadLettered { attempts });
        }

        match self.handler.handle_delivery(&event, ack).await {
            Ok(()) => {
                self.attempts.remove(&position);
                tracing::debug!(
                    event_id = %event.event_id,
                    handler = self.handler.name(),
                    "record processed"
                );
                Ok(PollOutcome::Processed)
            }
            Err(e) => {
                let entry = self.attempts.entry(position).or_insert((0, String::new()));
                entry.0 += 1;
                entry.1 = e.to_string();
                let attempt = entry.0;
                tracing::warn!(
                    event_id = %event.event_id,
                    event_type = event.event_type(),
                    handler = self.handler.name(),
                    attempt,
                    max_attempts = self.config.max_attempts,
                    error = %e,
                    "handler failed, record will be redelivered"
                );
                Ok(PollOutcome::Failed { attempt })
            }
        }
    }

    async fn dead_letter(
        &self,
        record: &LogRecord,
        error: String,
        attempts: u32,
        ack: Box<dyn Acknowledgment>,
    ) -> Result<(), DomainError> {
        let body = DeadLetterRecord {
            source_topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            key: record.key.clone(),
            handler: self.handler.name().to_owned(),
            error,
            attempts,
            failed_at: self.clock.now(),
            payload: String::from_utf8_lossy(&record.payload).into_owned(),
        };
        let bytes = serde_json::to_vec(&body)?;
        let key = record.key.as_deref().unwrap_or_default();
        self.dead_letters
            .send(&self.config.dead_letter_topic, key, &bytes)
            .await?;
        ack.acknowledge().await?;
        tracing::info!(
            topic = %record.topic,
            offset = record.offset,
            dead_letter_topic = %self.config.dead_letter_topic,
            "record moved to dead-letter topic"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use meridian_core::error::DomainError;
    use meridian_core::event::DomainEvent;
    use meridian_core::log::EventLog;
    use meridian_test_support::{FixedClock, asset_created, fixed_time};

    use super::*;
    use crate::memory::InMemoryLog;

    const TOPIC: &str = "meridian.audit.dev.business.v1";
    const DLQ: &str = "meridian.audit.dev.dead-letter.v1";

    /// Handler that fails its first `failures` calls.
    #[derive(Default)]
    struct FlakyHandler {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for FlakyHandler {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<(), DomainError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(DomainError::Infrastructure("index unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    fn runner(log: &InMemoryLog, handler: Arc<dyn MessageHandler>, max_attempts: u32) -> ConsumerRunner {
        let config = ConsumerConfig::new("test", vec![TOPIC.into()], DLQ)
            .with_max_attempts(max_attempts)
            .with_poll_timeout(Duration::from_millis(10));
        ConsumerRunner::new(
            Arc::new(log.consumer("test", vec![TOPIC.into()])),
            Arc::new(log.clone()),
            handler,
            config,
        )
        .with_clock(Arc::new(FixedClock(fixed_time())))
    }

    async fn send_event(log: &InMemoryLog) -> DomainEvent {
        let event = asset_created("AST-001", &FixedClock(fixed_time()));
        log.send(TOPIC, &event.aggregate_id, &event.to_json_bytes().unwrap())
            .await
            .unwrap();
        event
    }

    #[tokio::test]
    async fn test_success_commits_record() {
        // Arrange
        let log = InMemoryLog::new();
        send_event(&log).await;
        let mut runner = runner(&log, Arc::new(FlakyHandler::default()), 5);

        // Act
        let outcome = runner.poll_once().await.unwrap();

        // Assert
        assert_eq!(outcome, PollOutcome::Processed);
        assert_eq!(log.lag("test", TOPIC).unwrap(), 0);
        assert_eq!(runner.poll_once().await.unwrap(), PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_failure_is_redelivered_then_succeeds() {
        let log = InMemoryLog::new();
        send_event(&log).await;
        let handler = Arc::new(FlakyHandler {
            failures: 2,
            ..FlakyHandler::default()
        });
        let mut runner = runner(&log, handler.clone(), 5);

        assert_eq!(runner.poll_once().await.unwrap(), PollOutcome::Failed { attempt: 1 });
        assert_eq!(runner.poll_once().await.unwrap(), PollOutcome::Failed { attempt: 2 });
        assert_eq!(runner.poll_once().await.unwrap(), PollOutcome::Processed);

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(log.records(DLQ).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_is_dead_lettered_after_max_attempts() {
        // Arrange
        let log = InMemoryLog::new();
        let event = send_event(&log).await;
        let handler = Arc::new(FlakyHandler {
            failures: usize::MAX,
            ..FlakyHandler::default()
        });
        let mut runner = runner(&log, handler.clone(), 3);

        // Act
        for attempt in 1..=3 {
            assert_eq!(runner.poll_once().await.unwrap(), PollOutcome::Failed { attempt });
        }
        let outcome = runner.poll_once().await.unwrap();

        // Assert
        assert_eq!(outcome, PollOutcome::DeadLettered { attempts: 3 });
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(log.lag("test", TOPIC).unwrap(), 0);
        let dead = log.records(DLQ).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].key.as_deref(), Some("AST-001"));
        let body: DeadLetterRecord = serde_json::from_slice(&dead[0].payload).unwrap();
        assert_eq!(body.handler, "flaky");
        assert_eq!(body.attempts, 3);
        assert_eq!(body.source_topic, TOPIC);
        assert!(body.error.contains("index unavailable"));
        assert!(body.payload.contains(&event.event_id.to_string()));
        assert_eq!(body.failed_at, fixed_time());
    }

    #[tokio::test]
    async fn test_undecodable_record_goes_straight_to_dead_letter() {
        let log = InMemoryLog::new();
        log.send(TOPIC, "AST-001", b"not json").await.unwrap();
        let handler = Arc::new(FlakyHandler::default());
        let mut runner = runner(&log, handler.clone(), 5);

        let outcome = runner.poll_once().await.unwrap();

        assert_eq!(outcome, PollOutcome::DeadLettered { attempts: 0 });
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(log.records(DLQ).unwrap().len(), 1);
        assert_eq!(log.lag("test", TOPIC).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let log = InMemoryLog::new();
        send_event(&log).await;
        let handler = Arc::new(FlakyHandler::default());
        let runner = runner(&log, handler.clone(), 5);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(runner.run(rx));
        for _ in 0..100 {
            if handler.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.lag("test", TOPIC).unwrap(), 0);
    }

    /// Handler that always fails and records when it was called.
    #[derive(Default)]
    struct TimedFailingHandler {
        calls: Mutex<Vec<tokio::time::Instant>>,
    }

    impl TimedFailingHandler {
        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageHandler for TimedFailingHandler {
        fn name(&self) -> &str {
            "timed"
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<(), DomainError> {
            self.calls.lock().unwrap().push(tokio::time::Instant::now());
            Err(DomainError::Infrastructure("search cluster down".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_backs_off_exponentially_after_handler_failures() {
        // Arrange
        let log = InMemoryLog::new();
        send_event(&log).await;
        let handler = Arc::new(TimedFailingHandler::default());
        let config = ConsumerConfig::new("test", vec![TOPIC.into()], DLQ)
            .with_max_attempts(100)
            .with_poll_timeout(Duration::from_millis(10))
            .with_error_backoff(Duration::from_secs(1))
            .with_max_backoff(Duration::from_secs(3));
        let runner = ConsumerRunner::new(
            Arc::new(log.consumer("test", vec![TOPIC.into()])),
            Arc::new(log.clone()),
            handler.clone(),
            config,
        );
        let (tx, rx) = watch::channel(false);

        // Act
        let task = tokio::spawn(runner.run(rx));
        while handler.call_count() < 5 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tx.send(true).unwrap();
        task.await.unwrap();

        // Assert
        let calls = handler.calls.lock().unwrap().clone();
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        let expected = [1, 2, 3, 3].map(Duration::from_secs);
        for (gap, min) in gaps.iter().zip(expected) {
            assert!(*gap >= min, "gap {gap:?} shorter than {min:?}");
            assert!(*gap < min + Duration::from_millis(500), "gap {gap:?} longer than {min:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_retry_pause() {
        let log = InMemoryLog::new();
        send_event(&log).await;
        let handler = Arc::new(TimedFailingHandler::default());
        let config = ConsumerConfig::new("test", vec![TOPIC.into()], DLQ)
            .with_poll_timeout(Duration::from_millis(10))
            .with_error_backoff(Duration::from_secs(60))
            .with_max_backoff(Duration::from_secs(60));
        let runner = ConsumerRunner::new(
            Arc::new(log.consumer("test", vec![TOPIC.into()])),
            Arc::new(log.clone()),
            handler.clone(),
            config,
        );
        let (tx, rx) = watch::channel(false);
        let started = tokio::time::Instant::now();

        let task = tokio::spawn(runner.run(rx));
        while handler.call_count() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(handler.call_count(), 1);
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
