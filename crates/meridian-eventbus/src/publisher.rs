//! Event publishing.
//!
//! Log sends leave through one outbound queue drained by a single task, so
//! records reach the log in the order their events were published.

use std::sync::Arc;

use meridian_audit::{LogIntegrationService, PublishSummary};
use meridian_core::error::DomainError;
use meridian_core::event::DomainEvent;
use meridian_core::repository::EventStore;
use meridian_event_store::PgEventStore;
use sqlx::PgConnection;
use tokio::sync::{mpsc, oneshot};

use crate::processor::EventProcessor;

/// Publications waiting for the outbound task before `publish` blocks.
const OUTBOUND_CAPACITY: usize = 1024;

enum Outbound {
    Send {
        event: DomainEvent,
        done: Option<oneshot::Sender<PublishSummary>>,
    },
    Flush(oneshot::Sender<()>),
}

async fn drain_outbound(
    integration: Arc<LogIntegrationService>,
    mut queue: mpsc::Receiver<Outbound>,
) {
    while let Some(item) = queue.recv().await {
        match item {
            Outbound::Send { event, done } => {
                let summary = integration.publish_event(&event).await;
                if !summary.is_complete() {
                    tracing::error!(
                        event_id = %event.event_id,
                        attempted = summary.attempted,
                        delivered = summary.delivered,
                        "event stored but not fully delivered to the log"
                    );
                }
                if let Some(done) = done {
                    if done.send(summary).is_err() {
                        tracing::debug!(event_id = %event.event_id, "publisher stopped waiting");
                    }
                }
            }
            Outbound::Flush(done) => {
                if done.send(()).is_err() {
                    tracing::debug!("flush caller stopped waiting");
                }
            }
        }
    }
    tracing::debug!("outbound log queue closed");
}

/// An event appended inside a caller's transaction, not yet dispatched.
///
/// Hand it to [`EventBus::complete`] once the transaction has committed;
/// dropping it after a rollback publishes nothing.
#[derive(Debug)]
#[must_use = "a pending publication does nothing until it is completed"]
pub struct PendingPublication {
    event: DomainEvent,
}

impl PendingPublication {
    /// The appended event.
    pub fn event(&self) -> &DomainEvent {
        &self.event
    }
}

/// Publishes domain events: store, then local dispatch, then the log.
///
/// Built once at process start and shared through an `Arc`.
pub struct EventBus {
    store: Arc<dyn EventStore>,
    transactional: Option<PgEventStore>,
    processor: Arc<EventProcessor>,
    integration: Arc<LogIntegrationService>,
    outbound: mpsc::Sender<Outbound>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("processor", &self.processor)
            .field("integration", &self.integration)
            .field("transactional", &self.transactional.is_some())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Creates a bus over the given collaborators and starts its outbound
    /// task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        processor: Arc<EventProcessor>,
        integration: Arc<LogIntegrationService>,
    ) -> Self {
        let (outbound, queue) = mpsc::channel(OUTBOUND_CAPACITY);
        tokio::spawn(drain_outbound(Arc::clone(&integration), queue));
        Self {
            store,
            transactional: None,
            processor,
            integration,
            outbound,
        }
    }

    /// Enables [`publish_in`](Self::publish_in) through `store`, which must
    /// share the database of the bus's store.
    #[must_use]
    pub fn with_transactional_store(mut self, store: PgEventStore) -> Self {
        self.transactional = Some(store);
        self
    }

    /// The processor used for local dispatch.
    #[must_use]
    pub fn processor(&self) -> &Arc<EventProcessor> {
        &self.processor
    }

    /// Publishes `event`.
    ///
    /// The log send is queued behind earlier publications; its failures are
    /// logged and never reach the caller.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Publishing` when the event cannot be stored. In
    /// that case no handler runs and nothing is sent.
    pub async fn publish(&self, event: DomainEvent) -> Result<DomainEvent, DomainError> {
        let event = self.append(event).await?;
        Ok(self.dispatch_and_queue(event).await)
    }

    /// Publishes `event` and waits for its log send to finish.
    ///
    /// # Errors
    ///
    /// Same as [`publish`](Self::publish); send failures are reported in the
    /// summary only.
    pub async fn publish_and_wait(
        &self,
        event: DomainEvent,
    ) -> Result<(DomainEvent, PublishSummary), DomainError> {
        let event = self.append(event).await?;
        let stored = self.dispatch(event).await;

        let (done, summary) = oneshot::channel();
        self.enqueue(stored.clone(), Some(done)).await;
        let summary = match summary.await {
            Ok(summary) => summary,
            Err(_) => {
                tracing::warn!(
                    event_id = %stored.event_id,
                    "outbound queue unavailable, sending inline"
                );
                self.integration.publish_event(&stored).await
            }
        };
        Ok((stored, summary))
    }

    /// Appends `event` on the caller's connection, typically inside the
    /// transaction that performs the business write.
    ///
    /// Nothing is dispatched or sent yet: commit, then pass the result to
    /// [`complete`](Self::complete).
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Publishing` when the bus has no transactional
    /// store or the append fails.
    pub async fn publish_in(
        &self,
        conn: &mut PgConnection,
        event: DomainEvent,
    ) -> Result<PendingPublication, DomainError> {
        let Some(store) = &self.transactional else {
            return Err(DomainError::Publishing {
                event_id: event.event_id,
                reason: "event bus has no transactional store".into(),
            });
        };
        let event = store
            .store_in_transaction(conn, &event)
            .await
            .map_err(|e| publishing_error(&event, &e))?;
        Ok(PendingPublication { event })
    }

    /// Dispatches and queues an event appended by
    /// [`publish_in`](Self::publish_in) whose transaction has committed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Publishing` if the event is not in the store,
    /// which means the transaction rolled back.
    pub async fn complete(&self, pending: PendingPublication) -> Result<DomainEvent, DomainError> {
        let event = pending.event;
        match self.store.find_by_event_id(event.event_id).await {
            Ok(Some(_)) => Ok(self.dispatch_and_queue(event).await),
            Ok(None) => Err(DomainError::Publishing {
                event_id: event.event_id,
                reason: "event was not committed".into(),
            }),
            Err(e) => Err(publishing_error(&event, &e)),
        }
    }

    /// Waits until every publication queued so far has been sent.
    pub async fn flush(&self) {
        let (done, flushed) = oneshot::channel();
        if self.outbound.send(Outbound::Flush(done)).await.is_err() || flushed.await.is_err() {
            tracing::warn!("outbound queue closed before flush");
        }
    }

    async fn append(&self, event: DomainEvent) -> Result<DomainEvent, DomainError> {
        self.store
            .store(&event)
            .await
            .map_err(|e| publishing_error(&event, &e))
    }

    async fn dispatch(&self, mut stored: DomainEvent) -> DomainEvent {
        tracing::info!(
            event_id = %stored.event_id,
            event_type = stored.event_type(),
            aggregate_id = %stored.aggregate_id,
            "event stored"
        );

        let report = self.processor.handle_local_event(&stored).await;
        stored.processed = report.marked_processed;
        stored
    }

    async fn dispatch_and_queue(&self, event: DomainEvent) -> DomainEvent {
        let stored = self.dispatch(event).await;
        self.enqueue(stored.clone(), None).await;
        stored
    }

    async fn enqueue(&self, event: DomainEvent, done: Option<oneshot::Sender<PublishSummary>>) {
        let event_id = event.event_id;
        if self.outbound.send(Outbound::Send { event, done }).await.is_err() {
            tracing::error!(%event_id, "outbound log queue closed, event not sent");
        }
    }
}

fn publishing_error(event: &DomainEvent, error: &DomainError) -> DomainError {
    tracing::error!(
        event_id = %event.event_id,
        event_type = event.event_type(),
        error = %error,
        "failed to store event"
    );
    DomainError::Publishing {
        event_id: event.event_id,
        reason: error.to_string(),
    }
}
