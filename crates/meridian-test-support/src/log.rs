//! Test logs: recording and failing `EventLog` doubles plus an
//! acknowledgement handle that counts commits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use meridian_core::error::DomainError;
use meridian_core::event::DomainEvent;
use meridian_core::log::{Acknowledgment, EventLog};

/// One record captured by [`RecordingEventLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    /// Destination topic.
    pub topic: String,
    /// Partitioning key.
    pub key: String,
    /// Encoded payload.
    pub payload: Vec<u8>,
}

impl SentRecord {
    /// Decodes the payload back into an event.
    ///
    /// # Errors
    ///
    /// Returns the decoding error if the payload is not an event envelope.
    pub fn event(&self) -> Result<DomainEvent, DomainError> {
        DomainEvent::from_json_slice(&self.payload)
    }
}

/// An event log that records every send and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingEventLog {
    sent: Mutex<Vec<SentRecord>>,
}

impl RecordingEventLog {
    /// Creates an empty recording log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all sent records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns the records sent to `topic`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent_to(&self, topic: &str) -> Vec<SentRecord> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventLog for RecordingEventLog {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), DomainError> {
        self.sent.lock().unwrap().push(SentRecord {
            topic: topic.to_owned(),
            key: key.to_owned(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

/// An event log whose every send fails and counts the attempts.
#[derive(Debug, Default)]
pub struct FailingEventLog {
    attempts: AtomicUsize,
}

impl FailingEventLog {
    /// Creates a failing log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of send attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventLog for FailingEventLog {
    async fn send(&self, topic: &str, _key: &str, _payload: &[u8]) -> Result<(), DomainError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::Delivery(format!("broker unavailable for {topic}")))
    }
}

/// Shared counter of acknowledgements issued through [`RecordingAck`]s.
#[derive(Debug, Clone, Default)]
pub struct AckCounter(Arc<AtomicUsize>);

impl AckCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a boxed acknowledgement handle bound to this counter.
    #[must_use]
    pub fn handle(&self) -> Box<dyn Acknowledgment> {
        Box::new(RecordingAck(self.clone()))
    }

    /// Number of acknowledgements so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Acknowledgement handle that increments an [`AckCounter`].
#[derive(Debug)]
pub struct RecordingAck(AckCounter);

#[async_trait]
impl Acknowledgment for RecordingAck {
    async fn acknowledge(self: Box<Self>) -> Result<(), DomainError> {
        (self.0).0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
