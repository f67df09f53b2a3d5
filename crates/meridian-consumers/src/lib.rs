//! Meridian Consumers: the roles that read the category topics.
//!
//! Every role implements `meridian_log::MessageHandler` and is idempotent
//! on `event_id`, so redelivered records are harmless:
//!
//! - [`ComplianceMonitor`] persists compliance events and triggers
//!   remediation for high-priority ones.
//! - [`IndexingConsumer`] projects events into monthly search indexes,
//!   kept in PostgreSQL by [`PgDocumentIndex`].
//! - [`ReportingConsumer`] keeps running report counters.
//! - [`DistributedDispatch`] feeds remote events to the local handlers.
//!
//! [`ComplianceReport`] summarizes stored compliance activity for a period.

pub mod compliance;
pub mod dispatch;
pub mod document;
pub mod index;
pub mod indexing;
pub mod pg_index;
pub mod report;
pub mod reporting;

pub use compliance::{ComplianceMonitor, LoggingRemediationHook, RemediationHook};
pub use dispatch::DistributedDispatch;
pub use document::{SearchDocument, index_name};
pub use index::{DocumentIndex, InMemoryDocumentIndex};
pub use indexing::IndexingConsumer;
pub use pg_index::PgDocumentIndex;
pub use report::ComplianceReport;
pub use reporting::{ReportAggregate, ReportingConsumer};
