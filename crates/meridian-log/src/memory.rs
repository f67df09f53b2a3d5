//! In-process distributed log.
//!
//! Topics are split into a fixed number of partitions; a record's partition
//! is chosen from its key, so records of one aggregate stay in order. Each
//! consumer group keeps one committed offset per partition. A poll returns
//! the first uncommitted record of some partition, so a record that is never
//! acknowledged is returned again by the next poll.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use meridian_core::error::DomainError;
use meridian_core::log::{Acknowledgment, Delivery, EventLog, LogConsumer, LogRecord};
use tokio::sync::Notify;
use tokio::time::Instant;

const DEFAULT_PARTITIONS: usize = 3;

#[derive(Debug, Clone)]
struct Stored {
    key: Option<String>,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct LogState {
    topics: HashMap<String, Vec<Vec<Stored>>>,
    /// (group, topic, partition) → next offset to deliver.
    committed: HashMap<(String, String, usize), usize>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<LogState>,
    appended: Notify,
    partitions: usize,
}

impl Shared {
    fn state(&self) -> Result<MutexGuard<'_, LogState>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::Infrastructure("in-memory log lock poisoned".into()))
    }
}

/// Log kept in memory and shared by clones of this handle.
#[derive(Debug, Clone)]
pub struct InMemoryLog {
    shared: Arc<Shared>,
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }
}

impl InMemoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log whose topics have `partitions` partitions (at least one).
    #[must_use]
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LogState::default()),
                appended: Notify::new(),
                partitions: partitions.max(1),
            }),
        }
    }

    /// Partition a record with `key` is written to.
    #[must_use]
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let partitions = self.shared.partitions as u64;
        // The remainder is below `partitions`, which is a usize.
        usize::try_from(hasher.finish() % partitions).unwrap_or(0)
    }

    /// Creates a consumer for `group` subscribed to `topics`.
    #[must_use]
    pub fn consumer(&self, group: impl Into<String>, topics: Vec<String>) -> InMemoryConsumer {
        InMemoryConsumer {
            shared: Arc::clone(&self.shared),
            group: group.into(),
            topics,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Every record written to `topic`, partition by partition.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the log lock is poisoned.
    pub fn records(&self, topic: &str) -> Result<Vec<LogRecord>, DomainError> {
        let state = self.shared.state()?;
        let Some(partitions) = state.topics.get(topic) else {
            return Ok(Vec::new());
        };
        Ok(partitions
            .iter()
            .enumerate()
            .flat_map(|(partition, records)| {
                records
                    .iter()
                    .enumerate()
                    .map(move |(offset, stored)| to_record(topic, partition, offset, stored))
            })
            .collect())
    }

    /// Records of `topic` not yet committed by `group`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the log lock is poisoned.
    pub fn lag(&self, group: &str, topic: &str) -> Result<usize, DomainError> {
        let state = self.shared.state()?;
        let Some(partitions) = state.topics.get(topic) else {
            return Ok(0);
        };
        Ok(partitions
            .iter()
            .enumerate()
            .map(|(partition, records)| {
                let committed = state
                    .committed
                    .get(&(group.to_owned(), topic.to_owned(), partition))
                    .copied()
                    .unwrap_or(0);
                records.len().saturating_sub(committed)
            })
            .sum())
    }
}

fn to_record(topic: &str, partition: usize, offset: usize, stored: &Stored) -> LogRecord {
    LogRecord {
        topic: topic.to_owned(),
        partition: i32::try_from(partition).unwrap_or(i32::MAX),
        offset: i64::try_from(offset).unwrap_or(i64::MAX),
        key: stored.key.clone(),
        payload: stored.payload.clone(),
    }
}

#[async_trait]
impl EventLog for InMemoryLog {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), DomainError> {
        let partition = self.partition_for(key);
        {
            let mut state = self.shared.state()?;
            let partitions = state
                .topics
                .entry(topic.to_owned())
                .or_insert_with(|| vec![Vec::new(); self.shared.partitions]);
            partitions[partition].push(Stored {
                key: Some(key.to_owned()),
                payload: payload.to_vec(),
            });
        }
        self.shared.appended.notify_waiters();
        Ok(())
    }
}

/// Consumer of one group over a set of topics.
#[derive(Debug)]
pub struct InMemoryConsumer {
    shared: Arc<Shared>,
    group: String,
    topics: Vec<String>,
    cursor: AtomicUsize,
}

impl InMemoryConsumer {
    /// Consumer group this consumer commits for.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Finds the next uncommitted record, rotating the starting partition so
    /// one busy partition cannot starve the others.
    fn next_delivery(&self) -> Result<Option<Delivery>, DomainError> {
        let state = self.shared.state()?;
        let slots: Vec<(&String, usize)> = self
            .topics
            .iter()
            .flat_map(|topic| (0..self.shared.partitions).map(move |p| (topic, p)))
            .collect();
        if slots.is_empty() {
            return Ok(None);
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % slots.len();

        for i in 0..slots.len() {
            let (topic, partition) = slots[(start + i) % slots.len()];
            let Some(records) = state.topics.get(topic).map(|p| &p[partition]) else {
                continue;
            };
            let offset = state
                .committed
                .get(&(self.group.clone(), topic.clone(), partition))
                .copied()
                .unwrap_or(0);
            if let Some(stored) = records.get(offset) {
                return Ok(Some(Delivery {
                    record: to_record(topic, partition, offset, stored),
                    ack: Box::new(InMemoryAck {
                        shared: Arc::clone(&self.shared),
                        group: self.group.clone(),
                        topic: topic.clone(),
                        partition,
                        offset,
                    }),
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl LogConsumer for InMemoryConsumer {
    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, DomainError> {
        let deadline = Instant::now() + timeout;
        loop {
            let appended = self.shared.appended.notified();
            if let Some(delivery) = self.next_delivery()? {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(None);
            }
        }
    }
}

/// Commits one record for one group.
struct InMemoryAck {
    shared: Arc<Shared>,
    group: String,
    topic: String,
    partition: usize,
    offset: usize,
}

#[async_trait]
impl Acknowledgment for InMemoryAck {
    async fn acknowledge(self: Box<Self>) -> Result<(), DomainError> {
        let mut state = self.shared.state()?;
        let committed = state
            .committed
            .entry((self.group.clone(), self.topic.clone(), self.partition))
            .or_insert(0);
        *committed = (*committed).max(self.offset + 1);
        Ok(())
    }
}
