//! Meridian Audit: audit/compliance classification and topic routing.
//!
//! Classifies audit and compliance events into categories, decides single-
//! versus multi-topic fan-out and priority, and sends events to the
//! category topics of the distributed log.

pub mod integration;
pub mod router;
pub mod topics;

pub use integration::{LogIntegrationService, PublishSummary};
pub use topics::TopicConfig;
