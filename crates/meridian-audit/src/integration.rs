//! Log integration service.
//!
//! Sends events to the category topics of the distributed log. Delivery
//! here is best-effort: by the time an event reaches this service it has
//! already been stored, so send failures are logged and counted, never
//! returned.

use std::collections::BTreeSet;
use std::sync::Arc;

use meridian_core::category::EventCategory;
use meridian_core::event::{DomainEvent, EventKind};
use meridian_core::log::EventLog;

use crate::router::{
    category_of, determine_audit_category, multiple_categories, should_route_to_multiple_topics,
};
use crate::topics::TopicConfig;

/// Outcome of publishing one event to its topics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Sends attempted.
    pub attempted: usize,
    /// Sends the log accepted.
    pub delivered: usize,
}

impl PublishSummary {
    /// True when every attempted send was accepted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.attempted == self.delivered
    }
}

/// Routes events to category topics, keyed by aggregate id.
pub struct LogIntegrationService {
    log: Arc<dyn EventLog>,
    topics: TopicConfig,
}

impl std::fmt::Debug for LogIntegrationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogIntegrationService")
            .field("topics", &self.topics)
            .finish_non_exhaustive()
    }
}

impl LogIntegrationService {
    /// Creates a service sending through `log`.
    #[must_use]
    pub fn new(log: Arc<dyn EventLog>, topics: TopicConfig) -> Self {
        Self { log, topics }
    }

    /// Topic configuration in use.
    #[must_use]
    pub fn topics(&self) -> &TopicConfig {
        &self.topics
    }

    /// Publishes an audit or compliance event to its category topics.
    ///
    /// Audit trail events go to every category of `multiple_categories`
    /// when multi-topic routing applies, otherwise to their single category.
    /// Compliance events go to the compliance topic. Other events are
    /// ignored.
    pub async fn publish_audit_event(&self, event: &DomainEvent) -> PublishSummary {
        match &event.kind {
            EventKind::AuditTrail(audit) => {
                let categories = if should_route_to_multiple_topics(audit) {
                    multiple_categories(audit)
                } else {
                    BTreeSet::from([determine_audit_category(audit)])
                };
                self.send_to(event, categories).await
            }
            EventKind::ComplianceAudit(_) => {
                self.send_to(event, [EventCategory::Compliance]).await
            }
            _ => {
                tracing::debug!(
                    event_id = %event.event_id,
                    event_type = event.event_type(),
                    "not an audit event, skipping audit publish"
                );
                PublishSummary::default()
            }
        }
    }

    /// Publishes any event: audit variants through
    /// [`publish_audit_event`](Self::publish_audit_event), everything else to
    /// the topic of its primary category.
    pub async fn publish_event(&self, event: &DomainEvent) -> PublishSummary {
        match &event.kind {
            EventKind::AuditTrail(_) | EventKind::ComplianceAudit(_) => {
                self.publish_audit_event(event).await
            }
            _ => self.send_to(event, [category_of(event)]).await,
        }
    }

    async fn send_to<I>(&self, event: &DomainEvent, categories: I) -> PublishSummary
    where
        I: IntoIterator<Item = EventCategory>,
    {
        let mut summary = PublishSummary::default();
        let payload = match event.to_json_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    event_id = %event.event_id,
                    error = %e,
                    "failed to encode event for the log"
                );
                return summary;
            }
        };

        for category in categories {
            let topic = self.topics.topic(category);
            summary.attempted += 1;
            match self.log.send(topic, &event.aggregate_id, &payload).await {
                Ok(()) => {
                    summary.delivered += 1;
                    tracing::debug!(
                        event_id = %event.event_id,
                        topic,
                        category = %category,
                        "event sent to log"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        event_id = %event.event_id,
                        topic,
                        category = %category,
                        error = %e,
                        "failed to send event to log"
                    );
                }
            }
        }
        summary
    }
}
