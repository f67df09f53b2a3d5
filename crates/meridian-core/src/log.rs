//! Distributed log abstraction.
//!
//! Producers send keyed records to topics; consumers poll one record at a
//! time and receive an explicit acknowledgement handle with it. Dropping the
//! handle without acknowledging leaves the record uncommitted, so the log
//! delivers it again.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DomainError;

/// A record read from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Partitioning key (the aggregate id).
    pub key: Option<String>,
    /// Encoded event envelope.
    pub payload: Vec<u8>,
}

/// Producer side of the distributed log.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Sends a record keyed by `key` to `topic`.
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), DomainError>;
}

/// Commits the consumer position past one delivered record.
#[async_trait]
pub trait Acknowledgment: Send {
    /// Commits the record's offset. Consumes the handle.
    async fn acknowledge(self: Box<Self>) -> Result<(), DomainError>;
}

/// One polled record together with its acknowledgement handle.
pub struct Delivery {
    /// The record.
    pub record: LogRecord,
    /// Commit handle for the record.
    pub ack: Box<dyn Acknowledgment>,
}

impl Delivery {
    /// Splits the delivery into its record and acknowledgement handle.
    #[must_use]
    pub fn into_parts(self) -> (LogRecord, Box<dyn Acknowledgment>) {
        (self.record, self.ack)
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

/// Consumer side of the distributed log.
#[async_trait]
pub trait LogConsumer: Send + Sync {
    /// Waits up to `timeout` for the next record.
    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, DomainError>;
}
