//! Kafka adapters over `rdkafka`.
//!
//! The producer waits for full acknowledgement from the brokers. Consumers
//! disable auto-commit and commit one offset per acknowledgement; a record
//! that was polled but not acknowledged is re-read by seeking back to it on
//! the next poll.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use meridian_core::error::DomainError;
use meridian_core::log::{Acknowledgment, Delivery, EventLog, LogConsumer, LogRecord};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};

use crate::config::{ConsumerConfig, KafkaConfig};

fn delivery_error(e: &KafkaError) -> DomainError {
    DomainError::Delivery(e.to_string())
}

/// Producer sending keyed records to Kafka.
pub struct KafkaEventLog {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl std::fmt::Debug for KafkaEventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaEventLog")
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

impl KafkaEventLog {
    /// Creates an idempotent producer.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Delivery` if the client cannot be created.
    pub fn new(config: &KafkaConfig) -> Result<Self, DomainError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.client_id)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| delivery_error(&e))?;
        Ok(Self {
            producer,
            send_timeout: config.send_timeout,
        })
    }
}

#[async_trait]
impl EventLog for KafkaEventLog {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), DomainError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        self.producer
            .send(record, self.send_timeout)
            .await
            .map(|_| ())
            .map_err(|(e, _)| delivery_error(&e))
    }
}

type Position = (String, i32, i64);

/// Consumer reading one group's subscription with manual commits.
pub struct KafkaLogConsumer {
    consumer: Arc<StreamConsumer>,
    /// Last delivery not yet acknowledged.
    outstanding: Arc<Mutex<Option<Position>>>,
}

impl std::fmt::Debug for KafkaLogConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaLogConsumer").finish_non_exhaustive()
    }
}

impl KafkaLogConsumer {
    /// Creates a consumer for `consumer.group_id` and subscribes it to
    /// `consumer.topics`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Delivery` if the client cannot be created or
    /// subscribed.
    pub fn new(kafka: &KafkaConfig, consumer: &ConsumerConfig) -> Result<Self, DomainError> {
        let stream: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &kafka.bootstrap_servers)
            .set("client.id", &kafka.client_id)
            .set("group.id", &consumer.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| delivery_error(&e))?;
        let topics: Vec<&str> = consumer.topics.iter().map(String::as_str).collect();
        stream.subscribe(&topics).map_err(|e| delivery_error(&e))?;
        Ok(Self {
            consumer: Arc::new(stream),
            outstanding: Arc::new(Mutex::new(None)),
        })
    }

    fn take_outstanding(&self) -> Result<Option<Position>, DomainError> {
        self.outstanding
            .lock()
            .map(|mut slot| slot.take())
            .map_err(|_| DomainError::Infrastructure("kafka consumer lock poisoned".into()))
    }

    fn set_outstanding(&self, position: Position) -> Result<(), DomainError> {
        let mut slot = self
            .outstanding
            .lock()
            .map_err(|_| DomainError::Infrastructure("kafka consumer lock poisoned".into()))?;
        *slot = Some(position);
        Ok(())
    }
}

#[async_trait]
impl LogConsumer for KafkaLogConsumer {
    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, DomainError> {
        if let Some((topic, partition, offset)) = self.take_outstanding()? {
            tracing::debug!(%topic, partition, offset, "rewinding to unacknowledged record");
            self.consumer
                .seek(&topic, partition, Offset::Offset(offset), timeout)
                .map_err(|e| delivery_error(&e))?;
        }

        let message = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => return Ok(None),
            Ok(Err(e)) => return Err(delivery_error(&e)),
            Ok(Ok(message)) => message,
        };

        let record = LogRecord {
            topic: message.topic().to_owned(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        };
        self.set_outstanding((record.topic.clone(), record.partition, record.offset))?;

        let ack = KafkaAck {
            consumer: Arc::clone(&self.consumer),
            outstanding: Arc::clone(&self.outstanding),
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
        };
        Ok(Some(Delivery {
            record,
            ack: Box::new(ack),
        }))
    }
}

/// Commits `offset + 1` for one partition.
struct KafkaAck {
    consumer: Arc<StreamConsumer>,
    outstanding: Arc<Mutex<Option<Position>>>,
    topic: String,
    partition: i32,
    offset: i64,
}

#[async_trait]
impl Acknowledgment for KafkaAck {
    async fn acknowledge(self: Box<Self>) -> Result<(), DomainError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))
            .map_err(|e| delivery_error(&e))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| delivery_error(&e))?;

        let mut slot = self
            .outstanding
            .lock()
            .map_err(|_| DomainError::Infrastructure("kafka consumer lock poisoned".into()))?;
        if slot.as_ref().is_some_and(|(topic, partition, offset)| {
            *topic == self.topic && *partition == self.partition && *offset == self.offset
        }) {
            *slot = None;
        }
        Ok(())
    }
}
