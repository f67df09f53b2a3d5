//! Compliance report over a period.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use meridian_audit::router::is_high_priority_compliance;
use meridian_core::error::DomainError;
use meridian_core::event::EventKind;
use meridian_core::repository::EventStore;
use serde::Serialize;

/// Compliance activity between `from` and `to`, inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total: usize,
    pub by_compliance_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub high_priority: usize,
    /// Assessments flagged as requiring remediation.
    pub open_remediations: usize,
    /// Audit event counts by event type, from the store.
    pub audit_summary: BTreeMap<String, i64>,
}

impl ComplianceReport {
    /// Builds the report from stored events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when `from` is after `to`, or the
    /// store error.
    pub async fn generate(
        store: &dyn EventStore,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if from > to {
            return Err(DomainError::Validation(format!(
                "report window starts after it ends: {from} > {to}"
            )));
        }

        let events = store.find_compliance_audit_events(from, to).await?;
        let audit_summary = store.audit_event_summary(from, to).await?;

        let mut report = Self {
            from,
            to,
            total: 0,
            by_compliance_type: BTreeMap::new(),
            by_status: BTreeMap::new(),
            high_priority: 0,
            open_remediations: 0,
            audit_summary,
        };

        for compliance in events.iter().filter_map(|e| match &e.kind {
            EventKind::ComplianceAudit(c) => Some(c),
            _ => None,
        }) {
            report.total += 1;
            *report
                .by_compliance_type
                .entry(compliance.compliance_type.to_ascii_uppercase())
                .or_default() += 1;
            *report
                .by_status
                .entry(compliance.status.to_ascii_uppercase())
                .or_default() += 1;
            if is_high_priority_compliance(compliance) {
                report.high_priority += 1;
            }
            if compliance.remediation_required {
                report.open_remediations += 1;
            }
        }

        tracing::info!(
            %from,
            %to,
            total = report.total,
            high_priority = report.high_priority,
            "compliance report generated"
        );
        Ok(report)
    }
}
