//! Audit/compliance event classification.
//!
//! Every function here is a deterministic lookup against fixed tables.
//! Action types are compared case-insensitively.

use std::collections::BTreeSet;

use meridian_core::category::EventCategory;
use meridian_core::event::{AuditTrail, ComplianceAudit, DomainEvent, EventKind};

/// Action types classified as `SECURITY`.
pub const SECURITY_ACTION_TYPES: &[&str] = &[
    "LOGIN",
    "LOGOUT",
    "LOGIN_FAILED",
    "PASSWORD_CHANGE",
    "PASSWORD_RESET",
    "ROLE_CHANGE",
    "PERMISSION_CHANGE",
    "ACCESS_DENIED",
    "ACCOUNT_LOCKED",
    "ACCOUNT_UNLOCKED",
    "MFA_ENABLED",
    "MFA_DISABLED",
    "TOKEN_REVOKED",
];

/// Action types classified as `SYSTEM`.
pub const SYSTEM_ACTION_TYPES: &[&str] = &[
    "CONFIGURATION_CHANGE",
    "SYSTEM_STARTUP",
    "SYSTEM_SHUTDOWN",
    "BACKUP",
    "RESTORE",
    "SCHEDULED_JOB",
    "DATA_MIGRATION",
    "REINDEX",
    "CACHE_EVICTION",
];

/// Action types published to more than one category topic.
pub const MULTI_TOPIC_ACTION_TYPES: &[&str] = &[
    "DELETE",
    "ROLE_CHANGE",
    "PERMISSION_CHANGE",
    "CONFIGURATION_CHANGE",
];

/// Action types flagged as high priority.
pub const HIGH_PRIORITY_ACTION_TYPES: &[&str] = &[
    "DELETE",
    "BULK_DELETE",
    "ROLE_CHANGE",
    "PERMISSION_CHANGE",
    "CONFIGURATION_CHANGE",
    "LOGIN_FAILED",
    "ACCESS_DENIED",
    "ACCOUNT_LOCKED",
    "EXPORT",
];

/// Compliance types that are always high priority.
pub const REGULATED_COMPLIANCE_TYPES: &[&str] = &["SOX", "GDPR", "PCI_DSS", "HIPAA", "IFRS16"];

fn normalized_action(event: &AuditTrail) -> Option<String> {
    event
        .action_type
        .as_deref()
        .map(|a| a.trim().to_ascii_uppercase())
        .filter(|a| !a.is_empty())
}

fn action_in(event: &AuditTrail, table: &[&str]) -> bool {
    normalized_action(event).is_some_and(|action| table.contains(&action.as_str()))
}

/// Classifies an audit trail event as `SECURITY`, `SYSTEM` or `BUSINESS`.
///
/// A missing or unrecognised action type defaults to `BUSINESS` with a
/// warning.
#[must_use]
pub fn determine_audit_category(event: &AuditTrail) -> EventCategory {
    let Some(action) = normalized_action(event) else {
        tracing::warn!(
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            "audit event has no action type, defaulting to BUSINESS"
        );
        return EventCategory::Business;
    };

    if SECURITY_ACTION_TYPES.contains(&action.as_str()) {
        EventCategory::Security
    } else if SYSTEM_ACTION_TYPES.contains(&action.as_str()) {
        EventCategory::System
    } else {
        tracing::warn!(action_type = %action, "unclassified action type, using BUSINESS");
        EventCategory::Business
    }
}

/// Compliance events always belong to `COMPLIANCE`.
#[must_use]
pub fn determine_compliance_category(_event: &ComplianceAudit) -> EventCategory {
    EventCategory::Compliance
}

/// True when the action must be published to more than one topic.
#[must_use]
pub fn should_route_to_multiple_topics(event: &AuditTrail) -> bool {
    action_in(event, MULTI_TOPIC_ACTION_TYPES)
}

/// Categories an audit event is published to, in category order.
#[must_use]
pub fn multiple_categories(event: &AuditTrail) -> BTreeSet<EventCategory> {
    match normalized_action(event).as_deref() {
        Some("DELETE" | "ROLE_CHANGE" | "PERMISSION_CHANGE") => {
            BTreeSet::from([EventCategory::Business, EventCategory::Security])
        }
        Some("CONFIGURATION_CHANGE") => {
            BTreeSet::from([EventCategory::Business, EventCategory::System])
        }
        _ => BTreeSet::from([determine_audit_category(event)]),
    }
}

/// True for high-priority audit actions.
#[must_use]
pub fn is_high_priority_audit(event: &AuditTrail) -> bool {
    action_in(event, HIGH_PRIORITY_ACTION_TYPES)
}

/// True for regulated compliance types, elevated risk, or pending remediation.
#[must_use]
pub fn is_high_priority_compliance(event: &ComplianceAudit) -> bool {
    let compliance_type = event.compliance_type.trim().to_ascii_uppercase();
    REGULATED_COMPLIANCE_TYPES.contains(&compliance_type.as_str())
        || event.risk_level.is_some_and(|risk| risk.is_elevated())
        || event.remediation_required
}

/// Primary category of any domain event.
///
/// Business facts and entity-state changes are `BUSINESS`.
#[must_use]
pub fn category_of(event: &DomainEvent) -> EventCategory {
    match &event.kind {
        EventKind::AuditTrail(audit) => determine_audit_category(audit),
        EventKind::ComplianceAudit(compliance) => determine_compliance_category(compliance),
        _ => EventCategory::Business,
    }
}

/// Priority of any domain event; only audit variants can be high priority.
#[must_use]
pub fn is_high_priority(event: &DomainEvent) -> bool {
    match &event.kind {
        EventKind::AuditTrail(audit) => is_high_priority_audit(audit),
        EventKind::ComplianceAudit(compliance) => is_high_priority_compliance(compliance),
        _ => false,
    }
}
