//! Domain event model.
//!
//! Every state-changing business operation is captured as a [`DomainEvent`]:
//! an envelope of identity, aggregate linkage and lifecycle fields around a
//! typed [`EventKind`] payload. The payload variant determines the event type,
//! so the two can never disagree.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DomainError;

/// Event type name of [`EventKind::AssetCreated`].
pub const ASSET_CREATED_EVENT_TYPE: &str = "AssetCreatedEvent";
/// Event type name of [`EventKind::AssetCategoryChanged`].
pub const ASSET_CATEGORY_CHANGED_EVENT_TYPE: &str = "AssetCategoryChangedEvent";
/// Event type name of [`EventKind::AssetDisposed`].
pub const ASSET_DISPOSED_EVENT_TYPE: &str = "AssetDisposedEvent";
/// Event type name of [`EventKind::AssetRevalued`].
pub const ASSET_REVALUED_EVENT_TYPE: &str = "AssetRevaluedEvent";
/// Event type name of [`EventKind::DepreciationCalculated`].
pub const DEPRECIATION_CALCULATED_EVENT_TYPE: &str = "DepreciationCalculatedEvent";
/// Event type name of [`EventKind::SettlementCreated`].
pub const SETTLEMENT_CREATED_EVENT_TYPE: &str = "SettlementCreatedEvent";
/// Event type name of [`EventKind::PaymentProcessed`].
pub const PAYMENT_PROCESSED_EVENT_TYPE: &str = "PaymentProcessedEvent";
/// Event type name of [`EventKind::InvoiceSettled`].
pub const INVOICE_SETTLED_EVENT_TYPE: &str = "InvoiceSettledEvent";
/// Event type name of [`EventKind::LeaseLiabilityRecognized`].
pub const LEASE_LIABILITY_RECOGNIZED_EVENT_TYPE: &str = "LeaseLiabilityRecognizedEvent";
/// Event type name of [`EventKind::AuditTrail`].
pub const AUDIT_TRAIL_EVENT_TYPE: &str = "AuditTrailEvent";
/// Event type name of [`EventKind::ComplianceAudit`].
pub const COMPLIANCE_AUDIT_EVENT_TYPE: &str = "ComplianceAuditEvent";
/// Event type name of [`EventKind::EntityStateChanged`].
pub const ENTITY_STATE_CHANGED_EVENT_TYPE: &str = "EntityStateChangedEvent";

/// Event types of the audit variants.
pub const AUDIT_EVENT_TYPES: [&str; 3] = [
    AUDIT_TRAIL_EVENT_TYPE,
    COMPLIANCE_AUDIT_EVENT_TYPE,
    ENTITY_STATE_CHANGED_EVENT_TYPE,
];

// Monetary amounts are integer minor units (cents) with an ISO 4217 code.

/// Emitted when a fixed asset is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCreated {
    /// Asset register number.
    pub asset_number: String,
    /// Free-text description.
    pub description: String,
    /// Asset category code.
    pub category: String,
    /// Acquisition cost in minor units.
    pub acquisition_cost: i64,
    /// ISO currency code.
    pub currency: String,
    /// Date the asset was acquired.
    pub acquisition_date: NaiveDate,
}

/// Emitted when an asset is moved to another category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCategoryChanged {
    /// Asset register number.
    pub asset_number: String,
    /// Category before the change.
    pub previous_category: String,
    /// Category after the change.
    pub new_category: String,
}

/// Emitted when an asset is disposed of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDisposed {
    /// Asset register number.
    pub asset_number: String,
    /// Disposal date.
    pub disposal_date: NaiveDate,
    /// Sale proceeds in minor units.
    pub proceeds: i64,
    /// Net book value at disposal in minor units.
    pub net_book_value: i64,
    /// ISO currency code.
    pub currency: String,
    /// Reason for disposal.
    pub reason: String,
}

/// Emitted when an asset is revalued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRevalued {
    /// Asset register number.
    pub asset_number: String,
    /// Carrying value before revaluation.
    pub previous_value: i64,
    /// Carrying value after revaluation.
    pub new_value: i64,
    /// ISO currency code.
    pub currency: String,
    /// Effective date of the revaluation.
    pub revaluation_date: NaiveDate,
}

/// Emitted by a depreciation run for one asset and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepreciationCalculated {
    /// Asset register number.
    pub asset_number: String,
    /// Accounting period, e.g. `2026-09`.
    pub period: String,
    /// Depreciation charge for the period.
    pub depreciation_amount: i64,
    /// Accumulated depreciation after the charge.
    pub accumulated_depreciation: i64,
    /// Net book value after the charge.
    pub net_book_value: i64,
    /// ISO currency code.
    pub currency: String,
}

/// Emitted when a settlement is raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementCreated {
    /// Settlement number.
    pub settlement_number: String,
    /// Payee name or dealer code.
    pub payee: String,
    /// Settlement amount.
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Settlement date.
    pub settlement_date: NaiveDate,
}

/// Emitted when a payment is processed against a settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProcessed {
    /// Payment number.
    pub payment_number: String,
    /// Settlement the payment belongs to.
    pub settlement_number: String,
    /// Amount paid.
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Payment date.
    pub payment_date: NaiveDate,
}

/// Emitted when an invoice is settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSettled {
    /// Invoice number.
    pub invoice_number: String,
    /// Settlement that cleared the invoice.
    pub settlement_number: String,
    /// Amount settled.
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
}

/// Emitted when a lease liability is first recognised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseLiabilityRecognized {
    /// Lease contract number.
    pub lease_contract_number: String,
    /// Initial lease liability.
    pub liability_amount: i64,
    /// Initial right-of-use asset.
    pub right_of_use_amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Lease commencement date.
    pub commencement_date: NaiveDate,
}

/// A user action recorded for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    /// Acting user identifier.
    pub user_id: Option<String>,
    /// Acting user name.
    pub username: Option<String>,
    /// Action performed, e.g. `CREATE`, `DELETE`, `LOGIN`.
    pub action_type: Option<String>,
    /// Type of the entity acted upon.
    pub entity_type: String,
    /// Identifier of the entity acted upon.
    pub entity_id: String,
    /// Entity snapshot before the action.
    pub before_snapshot: Option<Value>,
    /// Entity snapshot after the action.
    pub after_snapshot: Option<Value>,
    /// Client IP address.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Session identifier.
    pub session_id: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

/// Risk rating attached to a compliance assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
    /// Critical risk.
    Critical,
}

impl RiskLevel {
    /// True for `High` and `Critical`.
    #[must_use]
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// A regulatory compliance assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAudit {
    /// Regulation family, e.g. `SOX`, `GDPR`, `IFRS16`.
    pub compliance_type: String,
    /// Specific regulation clause.
    pub regulation_reference: Option<String>,
    /// Assessment status, e.g. `COMPLIANT`, `NON_COMPLIANT`.
    pub status: String,
    /// Assessed risk.
    pub risk_level: Option<RiskLevel>,
    /// Whether remediation work is required.
    pub remediation_required: bool,
    /// Type of the assessed entity.
    pub entity_type: String,
    /// Identifier of the assessed entity.
    pub entity_id: String,
    /// Assessor.
    pub assessed_by: Option<String>,
    /// Assessment findings.
    pub findings: Option<String>,
}

/// One field-level change of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Field name.
    pub field: String,
    /// Value before the change.
    pub old_value: Value,
    /// Value after the change.
    pub new_value: Value,
}

/// Field-level before/after record of an entity mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStateChanged {
    /// Type of the changed entity.
    pub entity_type: String,
    /// Identifier of the changed entity.
    pub entity_id: String,
    /// User that made the change.
    pub changed_by: Option<String>,
    /// Changed fields.
    pub changes: Vec<FieldChange>,
}

/// Event payload variants, discriminated by event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum EventKind {
    /// An asset was registered.
    #[serde(rename = "AssetCreatedEvent")]
    AssetCreated(AssetCreated),
    /// An asset changed category.
    #[serde(rename = "AssetCategoryChangedEvent")]
    AssetCategoryChanged(AssetCategoryChanged),
    /// An asset was disposed of.
    #[serde(rename = "AssetDisposedEvent")]
    AssetDisposed(AssetDisposed),
    /// An asset was revalued.
    #[serde(rename = "AssetRevaluedEvent")]
    AssetRevalued(AssetRevalued),
    /// Depreciation was charged.
    #[serde(rename = "DepreciationCalculatedEvent")]
    DepreciationCalculated(DepreciationCalculated),
    /// A settlement was raised.
    #[serde(rename = "SettlementCreatedEvent")]
    SettlementCreated(SettlementCreated),
    /// A payment was processed.
    #[serde(rename = "PaymentProcessedEvent")]
    PaymentProcessed(PaymentProcessed),
    /// An invoice was settled.
    #[serde(rename = "InvoiceSettledEvent")]
    InvoiceSettled(InvoiceSettled),
    /// A lease liability was recognised.
    #[serde(rename = "LeaseLiabilityRecognizedEvent")]
    LeaseLiabilityRecognized(LeaseLiabilityRecognized),
    /// A user action for the audit trail.
    #[serde(rename = "AuditTrailEvent")]
    AuditTrail(AuditTrail),
    /// A compliance assessment.
    #[serde(rename = "ComplianceAuditEvent")]
    ComplianceAudit(ComplianceAudit),
    /// Field-level entity change.
    #[serde(rename = "EntityStateChangedEvent")]
    EntityStateChanged(EntityStateChanged),
}

impl EventKind {
    /// Returns the logical event type name used for routing and dispatch.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AssetCreated(_) => ASSET_CREATED_EVENT_TYPE,
            Self::AssetCategoryChanged(_) => ASSET_CATEGORY_CHANGED_EVENT_TYPE,
            Self::AssetDisposed(_) => ASSET_DISPOSED_EVENT_TYPE,
            Self::AssetRevalued(_) => ASSET_REVALUED_EVENT_TYPE,
            Self::DepreciationCalculated(_) => DEPRECIATION_CALCULATED_EVENT_TYPE,
            Self::SettlementCreated(_) => SETTLEMENT_CREATED_EVENT_TYPE,
            Self::PaymentProcessed(_) => PAYMENT_PROCESSED_EVENT_TYPE,
            Self::InvoiceSettled(_) => INVOICE_SETTLED_EVENT_TYPE,
            Self::LeaseLiabilityRecognized(_) => LEASE_LIABILITY_RECOGNIZED_EVENT_TYPE,
            Self::AuditTrail(_) => AUDIT_TRAIL_EVENT_TYPE,
            Self::ComplianceAudit(_) => COMPLIANCE_AUDIT_EVENT_TYPE,
            Self::EntityStateChanged(_) => ENTITY_STATE_CHANGED_EVENT_TYPE,
        }
    }

    /// True for the audit trail, compliance and entity-state variants.
    #[must_use]
    pub fn is_audit(&self) -> bool {
        matches!(
            self,
            Self::AuditTrail(_) | Self::ComplianceAudit(_) | Self::EntityStateChanged(_)
        )
    }

    /// Serializes the variant's payload without the discriminator.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    pub fn to_payload(&self) -> Result<Value, DomainError> {
        match serde_json::to_value(self)? {
            Value::Object(mut map) => map.remove("payload").ok_or_else(|| {
                DomainError::Serialization(format!("{} has no payload", self.event_type()))
            }),
            other => Err(DomainError::Serialization(format!(
                "unexpected payload encoding: {other}"
            ))),
        }
    }

    /// Rebuilds a variant from its discriminator and payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidEventKind` if the event type is unknown or
    /// the payload does not match it.
    pub fn from_payload(event_type: &str, payload: Value) -> Result<Self, DomainError> {
        serde_json::from_value(serde_json::json!({
            "event_type": event_type,
            "payload": payload,
        }))
        .map_err(|e| DomainError::InvalidEventKind(format!("{event_type}: {e}")))
    }
}

/// An immutable domain event.
///
/// Only the store changes `processed` and `retry_count` once the event has
/// been appended.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    /// Globally unique identity.
    pub event_id: Uuid,
    /// Business entity instance the event is about.
    pub aggregate_id: String,
    /// Kind of business entity.
    pub aggregate_type: String,
    /// Instant the event was constructed.
    pub occurred_on: DateTime<Utc>,
    /// Event instance version, starting at 1.
    pub version: i32,
    /// Causal chain this event belongs to.
    pub correlation_id: Option<Uuid>,
    /// Set once dispatch has completed.
    pub processed: bool,
    /// Number of failed delivery attempts.
    pub retry_count: i32,
    /// Typed payload.
    pub kind: EventKind,
}

impl DomainEvent {
    /// Creates a new event stamped with the clock's current time.
    #[must_use]
    pub fn new(
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        kind: EventKind,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            occurred_on: clock.now(),
            version: 1,
            correlation_id: None,
            processed: false,
            retry_count: 0,
            kind,
        }
    }

    /// Links the event to a causal chain.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Bumps the version by one and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the version would overflow; the
    /// event is left unchanged.
    pub fn next_version(&mut self) -> Result<i32, DomainError> {
        let next = self.version.checked_add(1).ok_or_else(|| {
            DomainError::Validation(format!(
                "{} {} cannot move past version {}",
                self.event_type(),
                self.event_id,
                self.version
            ))
        })?;
        self.version = next;
        Ok(next)
    }

    /// Returns the logical event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// True when the immutable parts of two events are equal, ignoring the
    /// `processed` and `retry_count` lifecycle fields.
    #[must_use]
    pub fn same_fact_as(&self, other: &Self) -> bool {
        self.event_id == other.event_id
            && self.aggregate_id == other.aggregate_id
            && self.aggregate_type == other.aggregate_type
            && self.occurred_on == other.occurred_on
            && self.version == other.version
            && self.correlation_id == other.correlation_id
            && self.kind == other.kind
    }

    /// Checks that the event can be stored as a concrete record.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidEventKind` if the aggregate linkage is
    /// blank or the version is not positive.
    pub fn ensure_persistable(&self) -> Result<(), DomainError> {
        if self.aggregate_id.trim().is_empty() {
            return Err(DomainError::InvalidEventKind(format!(
                "{} {} has no aggregate id",
                self.event_type(),
                self.event_id
            )));
        }
        if self.aggregate_type.trim().is_empty() {
            return Err(DomainError::InvalidEventKind(format!(
                "{} {} has no aggregate type",
                self.event_type(),
                self.event_id
            )));
        }
        if self.version < 1 {
            return Err(DomainError::InvalidEventKind(format!(
                "{} {} has version {}",
                self.event_type(),
                self.event_id,
                self.version
            )));
        }
        Ok(())
    }

    /// Encodes the event as a JSON [`EventEnvelope`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if encoding fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, DomainError> {
        let envelope = EventEnvelope::try_from(self)?;
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Decodes an event from a JSON [`EventEnvelope`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` for malformed JSON and
    /// `DomainError::InvalidEventKind` for an unknown event type.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, DomainError> {
        let envelope: EventEnvelope = serde_json::from_slice(bytes)?;
        Self::try_from(envelope)
    }
}

/// Wire and storage representation: base fields, discriminator and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event identity.
    pub event_id: Uuid,
    /// Discriminator.
    pub event_type: String,
    /// Aggregate identifier.
    pub aggregate_id: String,
    /// Aggregate type.
    pub aggregate_type: String,
    /// Construction instant.
    pub occurred_on: DateTime<Utc>,
    /// Event version.
    pub version: i32,
    /// Correlation identifier.
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    /// Dispatch marker.
    #[serde(default)]
    pub processed: bool,
    /// Failed delivery attempts.
    #[serde(default)]
    pub retry_count: i32,
    /// Variant payload.
    pub payload: Value,
}

impl TryFrom<&DomainEvent> for EventEnvelope {
    type Error = DomainError;

    fn try_from(event: &DomainEvent) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: event.event_id,
            event_type: event.event_type().to_owned(),
            aggregate_id: event.aggregate_id.clone(),
            aggregate_type: event.aggregate_type.clone(),
            occurred_on: event.occurred_on,
            version: event.version,
            correlation_id: event.correlation_id,
            processed: event.processed,
            retry_count: event.retry_count,
            payload: event.kind.to_payload()?,
        })
    }
}

impl TryFrom<EventEnvelope> for DomainEvent {
    type Error = DomainError;

    fn try_from(envelope: EventEnvelope) -> Result<Self, Self::Error> {
        let kind = EventKind::from_payload(&envelope.event_type, envelope.payload)?;
        Ok(Self {
            event_id: envelope.event_id,
            aggregate_id: envelope.aggregate_id,
            aggregate_type: envelope.aggregate_type,
            occurred_on: envelope.occurred_on,
            version: envelope.version,
            correlation_id: envelope.correlation_id,
            processed: envelope.processed,
            retry_count: envelope.retry_count,
            kind,
        })
    }
}
