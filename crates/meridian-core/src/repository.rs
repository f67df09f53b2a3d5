//! Event store abstraction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::DomainEvent;

/// Append-only store of domain events.
///
/// Appended events are never updated structurally or deleted; only the
/// `processed` flag and `retry_count` change in place.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends an event and returns the stored copy.
    ///
    /// Fails with `DomainError::InvalidEventKind` if the event cannot be
    /// persisted as a concrete record.
    async fn store(&self, event: &DomainEvent) -> Result<DomainEvent, DomainError>;

    /// Loads a single event by its identifier.
    async fn find_by_event_id(&self, event_id: Uuid) -> Result<Option<DomainEvent>, DomainError>;

    /// Loads an aggregate's events in ascending `occurred_on` order.
    async fn find_by_aggregate_id(&self, aggregate_id: &str)
    -> Result<Vec<DomainEvent>, DomainError>;

    /// Loads an aggregate's events from `from` (inclusive) onwards, ascending.
    async fn find_events_for_replay(
        &self,
        aggregate_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError>;

    /// Loads every event of one causal chain, ascending.
    async fn find_events_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<DomainEvent>, DomainError>;

    /// Loads audit trail and entity-state events for one entity in a window.
    async fn find_audit_trail_events(
        &self,
        entity_type: &str,
        entity_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError>;

    /// Loads compliance audit events in a window.
    async fn find_compliance_audit_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError>;

    /// Counts audit events per event type in a window.
    async fn audit_event_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<String, i64>, DomainError>;

    /// Sets `processed = true`. Marking an already processed event is a no-op.
    async fn mark_as_processed(&self, event_id: Uuid) -> Result<(), DomainError>;

    /// Whether remediation was already started for the event.
    async fn remediation_triggered(&self, event_id: Uuid) -> Result<bool, DomainError>;

    /// Records that remediation was started for the event.
    async fn mark_remediation_triggered(&self, event_id: Uuid) -> Result<(), DomainError>;

    /// Atomically increments `retry_count` and returns the new value.
    async fn increment_retry_count(&self, event_id: Uuid) -> Result<i32, DomainError>;

    /// Total number of stored events.
    async fn count(&self) -> Result<i64, DomainError>;
}
