//! Audit routing categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The audit-routing classification of an event.
///
/// Declaration order is significant: ordered category sets iterate
/// `Business`, `Security`, `System`, `Compliance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    /// Business facts and ordinary audit actions.
    Business,
    /// Authentication, authorization and access events.
    Security,
    /// Configuration and operational events.
    System,
    /// Regulatory compliance assessments.
    Compliance,
}

impl EventCategory {
    /// All categories in declaration order.
    pub const ALL: [Self; 4] = [Self::Business, Self::Security, Self::System, Self::Compliance];

    /// Upper-case name, as serialized.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Business => "BUSINESS",
            Self::Security => "SECURITY",
            Self::System => "SYSTEM",
            Self::Compliance => "COMPLIANCE",
        }
    }

    /// Lower-case segment used in topic and index names.
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Security => "security",
            Self::System => "system",
            Self::Compliance => "compliance",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUSINESS" => Ok(Self::Business),
            "SECURITY" => Ok(Self::Security),
            "SYSTEM" => Ok(Self::System),
            "COMPLIANCE" => Ok(Self::Compliance),
            other => Err(DomainError::Validation(format!(
                "unknown event category: {other}"
            ))),
        }
    }
}
