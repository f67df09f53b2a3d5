//! Test stores: failing `EventStore` implementation for error paths.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::error::DomainError;
use meridian_core::event::DomainEvent;
use meridian_core::repository::EventStore;
use uuid::Uuid;

/// An event store whose every operation returns an infrastructure error.
#[derive(Debug)]
pub struct FailingEventStore;

fn refused() -> DomainError {
    DomainError::Infrastructure("connection refused".into())
}

#[async_trait]
impl EventStore for FailingEventStore {
    async fn store(&self, _event: &DomainEvent) -> Result<DomainEvent, DomainError> {
        Err(refused())
    }

    async fn find_by_event_id(&self, _event_id: Uuid) -> Result<Option<DomainEvent>, DomainError> {
        Err(refused())
    }

    async fn find_by_aggregate_id(
        &self,
        _aggregate_id: &str,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        Err(refused())
    }

    async fn find_events_for_replay(
        &self,
        _aggregate_id: &str,
        _from: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        Err(refused())
    }

    async fn find_events_by_correlation_id(
        &self,
        _correlation_id: Uuid,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        Err(refused())
    }

    async fn find_audit_trail_events(
        &self,
        _entity_type: &str,
        _entity_id: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        Err(refused())
    }

    async fn find_compliance_audit_events(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        Err(refused())
    }

    async fn audit_event_summary(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<BTreeMap<String, i64>, DomainError> {
        Err(refused())
    }

    async fn mark_as_processed(&self, _event_id: Uuid) -> Result<(), DomainError> {
        Err(refused())
    }

    async fn remediation_triggered(&self, _event_id: Uuid) -> Result<bool, DomainError> {
        Err(refused())
    }

    async fn mark_remediation_triggered(&self, _event_id: Uuid) -> Result<(), DomainError> {
        Err(refused())
    }

    async fn increment_retry_count(&self, _event_id: Uuid) -> Result<i32, DomainError> {
        Err(refused())
    }

    async fn count(&self) -> Result<i64, DomainError> {
        Err(refused())
    }
}
