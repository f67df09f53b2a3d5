//! Event builders with realistic defaults.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use meridian_core::clock::Clock;
use meridian_core::event::{
    AssetCreated, AuditTrail, ComplianceAudit, DomainEvent, EntityStateChanged, EventKind,
    FieldChange, RiskLevel,
};
use serde_json::Value;

/// Fixed timestamp shared by tests: 2026-10-01T09:00:00Z.
///
/// # Panics
///
/// Never; the literal date is valid.
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0)
        .single()
        .expect("valid fixed test timestamp")
}

/// An `AssetCreatedEvent` for `asset_number`.
///
/// # Panics
///
/// Never; the literal acquisition date is valid.
#[must_use]
pub fn asset_created(asset_number: &str, clock: &dyn Clock) -> DomainEvent {
    DomainEvent::new(
        asset_number,
        "Asset",
        EventKind::AssetCreated(AssetCreated {
            asset_number: asset_number.to_owned(),
            description: "Delivery van".to_owned(),
            category: "MOTOR_VEHICLES".to_owned(),
            acquisition_cost: 4_500_000,
            currency: "KES".to_owned(),
            acquisition_date: NaiveDate::from_ymd_opt(2026, 9, 15).expect("valid date"),
        }),
        clock,
    )
}

/// An `AuditTrailEvent` by user `jdoe` on asset `entity_id`.
#[must_use]
pub fn audit_trail(action_type: Option<&str>, entity_id: &str, clock: &dyn Clock) -> DomainEvent {
    DomainEvent::new(
        entity_id,
        "Asset",
        EventKind::AuditTrail(AuditTrail {
            user_id: Some("u-1001".to_owned()),
            username: Some("jdoe".to_owned()),
            action_type: action_type.map(str::to_owned),
            entity_type: "Asset".to_owned(),
            entity_id: entity_id.to_owned(),
            before_snapshot: None,
            after_snapshot: None,
            ip_address: Some("10.0.4.17".to_owned()),
            user_agent: Some("Mozilla/5.0".to_owned()),
            session_id: None,
            description: None,
        }),
        clock,
    )
}

/// A `ComplianceAuditEvent` on lease `LSE-9`.
#[must_use]
pub fn compliance_audit(
    compliance_type: &str,
    risk_level: Option<RiskLevel>,
    remediation_required: bool,
    clock: &dyn Clock,
) -> DomainEvent {
    DomainEvent::new(
        "LSE-9",
        "Lease",
        EventKind::ComplianceAudit(ComplianceAudit {
            compliance_type: compliance_type.to_owned(),
            regulation_reference: None,
            status: "UNDER_REVIEW".to_owned(),
            risk_level,
            remediation_required,
            entity_type: "Lease".to_owned(),
            entity_id: "LSE-9".to_owned(),
            assessed_by: Some("auditor".to_owned()),
            findings: None,
        }),
        clock,
    )
}

/// An `EntityStateChangedEvent` with the given `(field, old, new)` changes.
#[must_use]
pub fn entity_state_changed(
    entity_type: &str,
    entity_id: &str,
    changes: Vec<(&str, Value, Value)>,
    clock: &dyn Clock,
) -> DomainEvent {
    DomainEvent::new(
        entity_id,
        entity_type,
        EventKind::EntityStateChanged(EntityStateChanged {
            entity_type: entity_type.to_owned(),
            entity_id: entity_id.to_owned(),
            changed_by: Some("jdoe".to_owned()),
            changes: changes
                .into_iter()
                .map(|(field, old_value, new_value)| FieldChange {
                    field: field.to_owned(),
                    old_value,
                    new_value,
                })
                .collect(),
        }),
        clock,
    )
}
