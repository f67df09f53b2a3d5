//! Replay and point-in-time reconstruction from the event store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use meridian_core::error::DomainError;
use meridian_core::event::{DomainEvent, EventKind};
use meridian_core::repository::EventStore;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::processor::EventProcessor;

/// Re-dispatches stored events through the processor.
pub struct EventReplayer {
    store: Arc<dyn EventStore>,
    processor: Arc<EventProcessor>,
}

impl std::fmt::Debug for EventReplayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReplayer").finish_non_exhaustive()
    }
}

impl EventReplayer {
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, processor: Arc<EventProcessor>) -> Self {
        Self { store, processor }
    }

    /// Replays the events of `aggregate_id` that occurred at or after `from`.
    ///
    /// Returns the number of events dispatched.
    ///
    /// # Errors
    ///
    /// Returns the store error if the events cannot be loaded. Handler
    /// failures do not stop the replay.
    pub async fn replay(&self, aggregate_id: &str, from: DateTime<Utc>) -> Result<usize, DomainError> {
        let events = self.store.find_events_for_replay(aggregate_id, from).await?;
        let replayed = self.dispatch_all(&events).await;
        tracing::info!(aggregate_id, %from, replayed, "aggregate replayed");
        Ok(replayed)
    }

    /// Replays every event sharing `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns the store error if the events cannot be loaded.
    pub async fn replay_correlation(&self, correlation_id: Uuid) -> Result<usize, DomainError> {
        let events = self
            .store
            .find_events_by_correlation_id(correlation_id)
            .await?;
        let replayed = self.dispatch_all(&events).await;
        tracing::info!(%correlation_id, replayed, "correlated events replayed");
        Ok(replayed)
    }

    async fn dispatch_all(&self, events: &[DomainEvent]) -> usize {
        for event in events {
            let report = self.processor.process_event(event).await;
            if !report.is_success() {
                tracing::warn!(
                    event_id = %event.event_id,
                    failures = report.failures.len(),
                    "replayed event had handler failures"
                );
            }
        }
        events.len()
    }
}

/// One event that contributed to an [`EntityHistory`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub event_id: Uuid,
    pub event_type: &'static str,
    pub occurred_on: DateTime<Utc>,
    /// User that made the change, when recorded.
    pub actor: Option<String>,
    /// Audit action type, for audit trail entries.
    pub action: Option<String>,
    /// Fields the event changed, sorted.
    pub changed_fields: Vec<String>,
}

/// State of an entity as of a point in time, rebuilt from its audit events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityHistory {
    pub entity_type: String,
    pub entity_id: String,
    pub as_of: DateTime<Utc>,
    /// Field → latest value.
    pub state: BTreeMap<String, Value>,
    /// Set by a `DELETE` audit action.
    pub deleted: bool,
    /// Contributing events, oldest first.
    pub timeline: Vec<HistoryEntry>,
}

impl EntityHistory {
    /// Folds the entity's state-change and audit trail events up to `as_of`.
    ///
    /// Field changes overwrite the field's value; an audit trail after
    /// snapshot overwrites every field it contains.
    ///
    /// # Errors
    ///
    /// Returns the store error if the events cannot be loaded.
    pub async fn reconstruct(
        store: &dyn EventStore,
        entity_type: &str,
        entity_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let events = store
            .find_audit_trail_events(entity_type, entity_id, DateTime::<Utc>::UNIX_EPOCH, as_of)
            .await?;

        let mut history = Self {
            entity_type: entity_type.to_owned(),
            entity_id: entity_id.to_owned(),
            as_of,
            state: BTreeMap::new(),
            deleted: false,
            timeline: Vec::with_capacity(events.len()),
        };
        for event in &events {
            history.apply(event);
        }
        Ok(history)
    }

    /// Current value of `field`, if any event set it.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.state.get(field)
    }

    fn apply(&mut self, event: &DomainEvent) {
        let (actor, action, mut changed_fields) = match &event.kind {
            EventKind::EntityStateChanged(changed) => {
                let mut fields = Vec::with_capacity(changed.changes.len());
                for change in &changed.changes {
                    self.state
                        .insert(change.field.clone(), change.new_value.clone());
                    fields.push(change.field.clone());
                }
                (changed.changed_by.clone(), None, fields)
            }
            EventKind::AuditTrail(audit) => {
                let mut fields = Vec::new();
                if let Some(Value::Object(snapshot)) = &audit.after_snapshot {
                    for (field, value) in snapshot {
                        self.state.insert(field.clone(), value.clone());
                        fields.push(field.clone());
                    }
                }
                let action = audit.action_type.as_deref().map(str::to_ascii_uppercase);
                if action.as_deref() == Some("DELETE") {
                    self.deleted = true;
                }
                (audit.username.clone(), action, fields)
            }
            _ => return,
        };
        changed_fields.sort();
        changed_fields.dedup();

        self.timeline.push(HistoryEntry {
            event_id: event.event_id,
            event_type: event.event_type(),
            occurred_on: event.occurred_on,
            actor,
            action,
            changed_fields,
        });
    }
}
