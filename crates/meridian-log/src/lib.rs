//! Meridian Log: distributed log adapters and the consumer runtime.
//!
//! [`InMemoryLog`] implements the producer and consumer contracts of
//! `meridian_core::log` with per-group committed offsets, so records that
//! are polled but never acknowledged are delivered again. The `kafka`
//! feature adds adapters over `rdkafka` with manual offset commits.
//!
//! [`ConsumerRunner`] drives one consumer role: it polls, decodes the event
//! envelope, invokes a [`MessageHandler`] and dead-letters records that keep
//! failing.

pub mod config;
pub mod memory;
pub mod runner;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use config::{ConsumerConfig, KafkaConfig};
pub use memory::{InMemoryConsumer, InMemoryLog};
pub use runner::{ConsumerRunner, DeadLetterRecord, MessageHandler, PollOutcome};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaEventLog, KafkaLogConsumer};
