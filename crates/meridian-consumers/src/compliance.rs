//! Compliance monitoring role.

use std::sync::Arc;

use async_trait::async_trait;
use meridian_audit::router::is_high_priority_compliance;
use meridian_core::error::DomainError;
use meridian_core::event::{ComplianceAudit, DomainEvent, EventKind};
use meridian_core::repository::EventStore;
use meridian_log::MessageHandler;

/// Starts remediation for a high-priority compliance finding.
#[async_trait]
pub trait RemediationHook: Send + Sync {
    async fn trigger(
        &self,
        event: &DomainEvent,
        compliance: &ComplianceAudit,
    ) -> Result<(), DomainError>;
}

/// Hook that only records the finding in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingRemediationHook;

#[async_trait]
impl RemediationHook for LoggingRemediationHook {
    async fn trigger(
        &self,
        event: &DomainEvent,
        compliance: &ComplianceAudit,
    ) -> Result<(), DomainError> {
        tracing::warn!(
            event_id = %event.event_id,
            compliance_type = %compliance.compliance_type,
            status = %compliance.status,
            risk_level = ?compliance.risk_level,
            remediation_required = compliance.remediation_required,
            entity_type = %compliance.entity_type,
            entity_id = %compliance.entity_id,
            "high-priority compliance finding requires remediation"
        );
        Ok(())
    }
}

/// Persists compliance events and escalates the high-priority ones.
///
/// The remediation marker lives on the stored event, so a restarted
/// monitor does not escalate the same finding twice.
pub struct ComplianceMonitor {
    store: Arc<dyn EventStore>,
    hook: Arc<dyn RemediationHook>,
}

impl ComplianceMonitor {
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, hook: Arc<dyn RemediationHook>) -> Self {
        Self { store, hook }
    }

    async fn persist_if_absent(&self, event: &DomainEvent) -> Result<(), DomainError> {
        if self.store.find_by_event_id(event.event_id).await?.is_some() {
            tracing::debug!(event_id = %event.event_id, "compliance event already stored");
            return Ok(());
        }
        match self.store.store(event).await {
            Ok(_) | Err(DomainError::DuplicateEvent(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MessageHandler for ComplianceMonitor {
    fn name(&self) -> &str {
        "compliance-monitor"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), DomainError> {
        let EventKind::ComplianceAudit(compliance) = &event.kind else {
            tracing::warn!(
                event_id = %event.event_id,
                event_type = event.event_type(),
                "non-compliance event on compliance topic, skipping"
            );
            return Ok(());
        };

        self.persist_if_absent(event).await?;

        if is_high_priority_compliance(compliance)
            && !self.store.remediation_triggered(event.event_id).await?
        {
            self.hook.trigger(event, compliance).await?;
            self.store.mark_remediation_triggered(event.event_id).await?;
        }

        tracing::info!(
            event_id = %event.event_id,
            compliance_type = %compliance.compliance_type,
            status = %compliance.status,
            "compliance event recorded"
        );
        Ok(())
    }
}
