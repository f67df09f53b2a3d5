//! Reporting role.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use meridian_audit::router::{category_of, is_high_priority};
use meridian_core::category::EventCategory;
use meridian_core::dedup::RecentIds;
use meridian_core::error::DomainError;
use meridian_core::event::DomainEvent;
use meridian_log::MessageHandler;
use serde::Serialize;

/// Running counters over every event seen once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportAggregate {
    pub total: u64,
    pub by_category: BTreeMap<EventCategory, u64>,
    pub by_event_type: BTreeMap<String, u64>,
    pub by_day: BTreeMap<NaiveDate, u64>,
    pub high_priority: u64,
}

impl ReportAggregate {
    fn record(&mut self, event: &DomainEvent) {
        self.total += 1;
        *self.by_category.entry(category_of(event)).or_default() += 1;
        *self
            .by_event_type
            .entry(event.event_type().to_owned())
            .or_default() += 1;
        *self.by_day.entry(event.occurred_on.date_naive()).or_default() += 1;
        if is_high_priority(event) {
            self.high_priority += 1;
        }
    }
}

#[derive(Debug, Default)]
struct ReportingState {
    seen: RecentIds,
    aggregate: ReportAggregate,
}

/// Counts events by category, type and day. Has no store side effects.
#[derive(Debug, Default)]
pub struct ReportingConsumer {
    state: Mutex<ReportingState>,
}

impl ReportingConsumer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumer that remembers at most `window` event ids for deduplication.
    #[must_use]
    pub fn with_window(window: usize) -> Self {
        Self {
            state: Mutex::new(ReportingState {
                seen: RecentIds::new(window),
                aggregate: ReportAggregate::default(),
            }),
        }
    }

    /// Copy of the current counters.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn snapshot(&self) -> Result<ReportAggregate, DomainError> {
        self.state
            .lock()
            .map(|state| state.aggregate.clone())
            .map_err(|_| DomainError::Infrastructure("report lock poisoned".into()))
    }
}

#[async_trait]
impl MessageHandler for ReportingConsumer {
    fn name(&self) -> &str {
        "reporting"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), DomainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| DomainError::Infrastructure("report lock poisoned".into()))?;
        if state.seen.insert(event.event_id) {
            state.aggregate.record(event);
        }
        Ok(())
    }
}
