//! In-memory implementation of the `EventStore` trait.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use meridian_core::error::DomainError;
use meridian_core::event::{DomainEvent, EventKind};
use meridian_core::repository::EventStore;

/// Event store that keeps events in insertion order behind a mutex.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<DomainEvent>>,
    /// Stored events whose remediation has started.
    remediated: Mutex<HashSet<Uuid>>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> Result<MutexGuard<'_, Vec<DomainEvent>>, DomainError> {
        self.events
            .lock()
            .map_err(|_| DomainError::Infrastructure("event store lock poisoned".into()))
    }

    /// Clones the events matching `predicate`, sorted by `occurred_on`.
    /// The sort is stable, so ties keep insertion order.
    fn select<F>(&self, predicate: F) -> Result<Vec<DomainEvent>, DomainError>
    where
        F: Fn(&DomainEvent) -> bool,
    {
        let mut selected: Vec<DomainEvent> =
            self.events()?.iter().filter(|e| predicate(e)).cloned().collect();
        selected.sort_by_key(|e| e.occurred_on);
        Ok(selected)
    }
}

fn within(event: &DomainEvent, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    event.occurred_on >= from && event.occurred_on <= to
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn store(&self, event: &DomainEvent) -> Result<DomainEvent, DomainError> {
        event.ensure_persistable()?;
        let mut events = self.events()?;
        if events.iter().any(|e| e.event_id == event.event_id) {
            return Err(DomainError::DuplicateEvent(event.event_id));
        }
        events.push(event.clone());
        Ok(event.clone())
    }

    async fn find_by_event_id(&self, event_id: Uuid) -> Result<Option<DomainEvent>, DomainError> {
        Ok(self
            .events()?
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned())
    }

    async fn find_by_aggregate_id(
        &self,
        aggregate_id: &str,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        self.select(|e| e.aggregate_id == aggregate_id)
    }

    async fn find_events_for_replay(
        &self,
        aggregate_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        self.select(|e| e.aggregate_id == aggregate_id && e.occurred_on >= from)
    }

    async fn find_events_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        self.select(|e| e.correlation_id == Some(correlation_id))
    }

    async fn find_audit_trail_events(
        &self,
        entity_type: &str,
        entity_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        self.select(|e| {
            matches!(
                e.kind,
                EventKind::AuditTrail(_) | EventKind::EntityStateChanged(_)
            ) && e.aggregate_type == entity_type
                && e.aggregate_id == entity_id
                && within(e, from, to)
        })
    }

    async fn find_compliance_audit_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        self.select(|e| matches!(e.kind, EventKind::ComplianceAudit(_)) && within(e, from, to))
    }

    async fn audit_event_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<String, i64>, DomainError> {
        let mut summary = BTreeMap::new();
        for event in self
            .events()?
            .iter()
            .filter(|e| e.kind.is_audit() && within(e, from, to))
        {
            *summary.entry(event.event_type().to_owned()).or_insert(0) += 1;
        }
        Ok(summary)
    }

    async fn mark_as_processed(&self, event_id: Uuid) -> Result<(), DomainError> {
        let mut events = self.events()?;
        let event = events
            .iter_mut()
            .find(|e| e.event_id == event_id)
            .ok_or(DomainError::EventNotFound(event_id))?;
        event.processed = true;
        Ok(())
    }

    async fn remediation_triggered(&self, event_id: Uuid) -> Result<bool, DomainError> {
        self.remediated
            .lock()
            .map(|set| set.contains(&event_id))
            .map_err(|_| DomainError::Infrastructure("event store lock poisoned".into()))
    }

    async fn mark_remediation_triggered(&self, event_id: Uuid) -> Result<(), DomainError> {
        if !self.events()?.iter().any(|e| e.event_id == event_id) {
            return Err(DomainError::EventNotFound(event_id));
        }
        self.remediated
            .lock()
            .map(|mut set| {
                set.insert(event_id);
            })
            .map_err(|_| DomainError::Infrastructure("event store lock poisoned".into()))
    }

    async fn increment_retry_count(&self, event_id: Uuid) -> Result<i32, DomainError> {
        let mut events = self.events()?;
        let event = events
            .iter_mut()
            .find(|e| e.event_id == event_id)
            .ok_or(DomainError::EventNotFound(event_id))?;
        event.retry_count += 1;
        Ok(event.retry_count)
    }

    async fn count(&self) -> Result<i64, DomainError> {
        let len = self.events()?.len();
        i64::try_from(len).map_err(|e| DomainError::Infrastructure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use meridian_core::error::DomainError;
    use meridian_core::repository::EventStore;
    use meridian_test_support::{
        FixedClock, asset_created, audit_trail, compliance_audit, entity_state_changed,
        fixed_time,
    };
    use serde_json::json;
    use uuid::Uuid;

    use super::InMemoryEventStore;

    #[tokio::test]
    async fn test_store_then_find_returns_equal_event() {
        // Arrange
        let store = InMemoryEventStore::new();
        let event = asset_created("AST-001", &FixedClock(fixed_time()));

        // Act
        store.store(&event).await.unwrap();
        let found = store.find_by_event_id(event.event_id).await.unwrap().unwrap();

        // Assert
        assert!(found.same_fact_as(&event));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_rejects_duplicate_event_id() {
        let store = InMemoryEventStore::new();
        let event = asset_created("AST-001", &FixedClock(fixed_time()));
        store.store(&event).await.unwrap();

        let result = store.store(&event).await;

        assert!(matches!(result, Err(DomainError::DuplicateEvent(id)) if id == event.event_id));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_rejects_event_without_aggregate_type() {
        let store = InMemoryEventStore::new();
        let mut event = asset_created("AST-001", &FixedClock(fixed_time()));
        event.aggregate_type = String::new();

        let result = store.store(&event).await;

        assert!(matches!(result, Err(DomainError::InvalidEventKind(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_by_aggregate_id_preserves_publish_order() {
        // Arrange: same timestamp, so only insertion order distinguishes them.
        let store = InMemoryEventStore::new();
        let clock = FixedClock(fixed_time());
        let first = asset_created("AST-001", &clock);
        let second = audit_trail(Some("UPDATE"), "AST-001", &clock);
        let other = asset_created("AST-002", &clock);
        store.store(&first).await.unwrap();
        store.store(&other).await.unwrap();
        store.store(&second).await.unwrap();

        // Act
        let events = store.find_by_aggregate_id("AST-001").await.unwrap();

        // Assert
        let ids: Vec<Uuid> = events.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![first.event_id, second.event_id]);
    }

    #[tokio::test]
    async fn test_find_by_aggregate_id_sorts_by_occurred_on() {
        let store = InMemoryEventStore::new();
        let later = asset_created("AST-001", &FixedClock(fixed_time() + Duration::hours(1)));
        let earlier = asset_created("AST-001", &FixedClock(fixed_time()));
        store.store(&later).await.unwrap();
        store.store(&earlier).await.unwrap();

        let events = store.find_by_aggregate_id("AST-001").await.unwrap();

        assert_eq!(events[0].event_id, earlier.event_id);
        assert_eq!(events[1].event_id, later.event_id);
    }

    #[tokio::test]
    async fn test_find_events_for_replay_is_inclusive_of_from() {
        let store = InMemoryEventStore::new();
        let before = asset_created("AST-001", &FixedClock(fixed_time() - Duration::days(1)));
        let at = asset_created("AST-001", &FixedClock(fixed_time()));
        store.store(&before).await.unwrap();
        store.store(&at).await.unwrap();

        let events = store
            .find_events_for_replay("AST-001", fixed_time())
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, at.event_id);
    }

    #[tokio::test]
    async fn test_find_events_by_correlation_id() {
        let store = InMemoryEventStore::new();
        let clock = FixedClock(fixed_time());
        let correlation_id = Uuid::new_v4();
        let linked = asset_created("AST-001", &clock).with_correlation_id(correlation_id);
        let unlinked = asset_created("AST-002", &clock);
        store.store(&linked).await.unwrap();
        store.store(&unlinked).await.unwrap();

        let events = store
            .find_events_by_correlation_id(correlation_id)
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, linked.event_id);
    }

    #[tokio::test]
    async fn test_find_audit_trail_events_filters_entity_kind_and_window() {
        // Arrange
        let store = InMemoryEventStore::new();
        let clock = FixedClock(fixed_time());
        let audit = audit_trail(Some("UPDATE"), "AST-001", &clock);
        let change = entity_state_changed(
            "Asset",
            "AST-001",
            vec![("location", json!("Nairobi"), json!("Mombasa"))],
            &clock,
        );
        let business = asset_created("AST-001", &clock);
        let other_entity = audit_trail(Some("UPDATE"), "AST-002", &clock);
        let too_late = audit_trail(
            Some("UPDATE"),
            "AST-001",
            &FixedClock(fixed_time() + Duration::days(30)),
        );
        for event in [&audit, &change, &business, &other_entity, &too_late] {
            store.store(event).await.unwrap();
        }

        // Act
        let events = store
            .find_audit_trail_events(
                "Asset",
                "AST-001",
                fixed_time() - Duration::days(1),
                fixed_time() + Duration::days(1),
            )
            .await
            .unwrap();

        // Assert
        let ids: Vec<Uuid> = events.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![audit.event_id, change.event_id]);
    }

    #[tokio::test]
    async fn test_compliance_queries_and_summary() {
        // Arrange
        let store = InMemoryEventStore::new();
        let clock = FixedClock(fixed_time());
        store
            .store(&compliance_audit("SOX", None, false, &clock))
            .await
            .unwrap();
        store
            .store(&compliance_audit("GDPR", None, true, &clock))
            .await
            .unwrap();
        store
            .store(&audit_trail(Some("LOGIN"), "USR-1", &clock))
            .await
            .unwrap();
        store.store(&asset_created("AST-001", &clock)).await.unwrap();
        let from = fixed_time() - Duration::hours(1);
        let to = fixed_time() + Duration::hours(1);

        // Act
        let compliance = store.find_compliance_audit_events(from, to).await.unwrap();
        let summary = store.audit_event_summary(from, to).await.unwrap();

        // Assert
        assert_eq!(compliance.len(), 2);
        assert_eq!(summary.get("ComplianceAuditEvent"), Some(&2));
        assert_eq!(summary.get("AuditTrailEvent"), Some(&1));
        assert_eq!(summary.get("AssetCreatedEvent"), None);
    }

    #[tokio::test]
    async fn test_mark_as_processed_is_idempotent() {
        let store = InMemoryEventStore::new();
        let event = asset_created("AST-001", &FixedClock(fixed_time()));
        store.store(&event).await.unwrap();

        store.mark_as_processed(event.event_id).await.unwrap();
        store.mark_as_processed(event.event_id).await.unwrap();

        let stored = store.find_by_event_id(event.event_id).await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_retry_count_returns_new_value() {
        let store = InMemoryEventStore::new();
        let event = asset_created("AST-001", &FixedClock(fixed_time()));
        store.store(&event).await.unwrap();

        assert_eq!(store.increment_retry_count(event.event_id).await.unwrap(), 1);
        assert_eq!(store.increment_retry_count(event.event_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_remediation_marker_is_idempotent() {
        // Arrange
        let store = InMemoryEventStore::new();
        let event = compliance_audit("SOX", None, true, &FixedClock(fixed_time()));
        store.store(&event).await.unwrap();
        assert!(!store.remediation_triggered(event.event_id).await.unwrap());

        // Act
        store.mark_remediation_triggered(event.event_id).await.unwrap();
        store.mark_remediation_triggered(event.event_id).await.unwrap();

        // Assert
        assert!(store.remediation_triggered(event.event_id).await.unwrap());
        assert!(!store.remediation_triggered(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_lifecycle_updates_on_unknown_event_fail() {
        let store = InMemoryEventStore::new();
        let missing = Uuid::new_v4();

        assert!(matches!(
            store.mark_as_processed(missing).await,
            Err(DomainError::EventNotFound(id)) if id == missing
        ));
        assert!(matches!(
            store.increment_retry_count(missing).await,
            Err(DomainError::EventNotFound(_))
        ));
        assert!(matches!(
            store.mark_remediation_triggered(missing).await,
            Err(DomainError::EventNotFound(_))
        ));
    }
}
