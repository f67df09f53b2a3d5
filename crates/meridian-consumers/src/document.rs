//! Search document projection.

use chrono::{DateTime, Utc};
use meridian_core::category::EventCategory;
use meridian_core::event::{DomainEvent, EventKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Name of the monthly index for `category`, e.g. `business-events-2026.10`.
#[must_use]
pub fn index_name(category: EventCategory, occurred_on: DateTime<Utc>) -> String {
    format!("{}-events-{}", category.slug(), occurred_on.format("%Y.%m"))
}

/// One indexed event, keyed by `event_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub occurred_on: DateTime<Utc>,
    pub version: i32,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    /// Variant-specific fields.
    pub metadata: Value,
    pub searchable_text: String,
}

impl SearchDocument {
    /// Projects `event` into its search form.
    #[must_use]
    pub fn from_event(event: &DomainEvent) -> Self {
        let (user_id, username, action) = actor(&event.kind);
        let metadata = metadata(&event.kind);

        let searchable_text = [
            Some(event.event_type()),
            Some(event.aggregate_type.as_str()),
            Some(event.aggregate_id.as_str()),
            username.as_deref(),
            action.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Self {
            event_id: event.event_id,
            event_type: event.event_type().to_owned(),
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id.clone(),
            occurred_on: event.occurred_on,
            version: event.version,
            correlation_id: event.correlation_id,
            user_id,
            username,
            metadata,
            searchable_text,
        }
    }
}

/// `(user_id, username, action)` of the event, where the variant records one.
fn actor(kind: &EventKind) -> (Option<String>, Option<String>, Option<String>) {
    match kind {
        EventKind::AuditTrail(audit) => (
            audit.user_id.clone(),
            audit.username.clone(),
            audit.action_type.clone(),
        ),
        EventKind::ComplianceAudit(compliance) => {
            (None, compliance.assessed_by.clone(), None)
        }
        EventKind::EntityStateChanged(changed) => (None, changed.changed_by.clone(), None),
        _ => (None, None, None),
    }
}

fn metadata(kind: &EventKind) -> Value {
    match kind {
        EventKind::AuditTrail(audit) => json!({
            "actionType": audit.action_type,
            "entityType": audit.entity_type,
            "entityId": audit.entity_id,
            "ipAddress": audit.ip_address,
            "userAgent": audit.user_agent,
            "sessionId": audit.session_id,
            "description": audit.description,
            "hasBeforeSnapshot": audit.before_snapshot.is_some(),
            "hasAfterSnapshot": audit.after_snapshot.is_some(),
        }),
        EventKind::ComplianceAudit(compliance) => json!({
            "complianceType": compliance.compliance_type,
            "regulationReference": compliance.regulation_reference,
            "status": compliance.status,
            "riskLevel": compliance.risk_level,
            "remediationRequired": compliance.remediation_required,
            "entityType": compliance.entity_type,
            "entityId": compliance.entity_id,
        }),
        EventKind::EntityStateChanged(changed) => json!({
            "entityType": changed.entity_type,
            "entityId": changed.entity_id,
            "changedFields": changed.changes.iter().map(|c| c.field.as_str()).collect::<Vec<_>>(),
        }),
        // Business payloads are flat; index their fields as they are.
        other => match other.to_payload() {
            Ok(Value::Object(fields)) => Value::Object(fields),
            _ => Value::Object(Map::new()),
        },
    }
}
