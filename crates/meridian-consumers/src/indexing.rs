//! Indexing role.

use std::sync::Arc;

use async_trait::async_trait;
use meridian_audit::router::category_of;
use meridian_core::error::DomainError;
use meridian_core::event::DomainEvent;
use meridian_log::MessageHandler;

use crate::document::{SearchDocument, index_name};
use crate::index::DocumentIndex;

/// Upserts every event into `<category>-events-YYYY.MM`.
///
/// Multi-topic audit events arrive once per topic; each delivery upserts the
/// same document into the index of the event's primary category.
pub struct IndexingConsumer {
    index: Arc<dyn DocumentIndex>,
}

impl IndexingConsumer {
    #[must_use]
    pub fn new(index: Arc<dyn DocumentIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl MessageHandler for IndexingConsumer {
    fn name(&self) -> &str {
        "indexing"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), DomainError> {
        let index = index_name(category_of(event), event.occurred_on);
        let document = SearchDocument::from_event(event);
        self.index.upsert(&index, &document).await?;
        tracing::debug!(event_id = %event.event_id, %index, "event indexed");
        Ok(())
    }
}
