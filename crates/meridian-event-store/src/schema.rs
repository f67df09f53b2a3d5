//! Event store database schema.

/// SQL to create the events table and its query indexes.
///
/// Kept in sync with the files under `migrations/`.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS domain_events (
    seq             BIGSERIAL,
    event_id        UUID PRIMARY KEY,
    event_type      VARCHAR(255) NOT NULL,
    aggregate_id    VARCHAR(255) NOT NULL,
    aggregate_type  VARCHAR(255) NOT NULL,
    occurred_on     TIMESTAMPTZ NOT NULL,
    version         INTEGER NOT NULL DEFAULT 1,
    correlation_id  UUID,
    processed       BOOLEAN NOT NULL DEFAULT FALSE,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    payload         JSONB NOT NULL,
    stored_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    remediation_triggered_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_domain_events_aggregate
    ON domain_events (aggregate_id, occurred_on);

CREATE INDEX IF NOT EXISTS idx_domain_events_correlation_id
    ON domain_events (correlation_id);

CREATE INDEX IF NOT EXISTS idx_domain_events_type_time
    ON domain_events (event_type, occurred_on);
";

/// Columns selected when loading events, in `EventRow` order.
pub(crate) const EVENT_COLUMNS: &str = "event_id, event_type, aggregate_id, aggregate_type, \
     occurred_on, version, correlation_id, processed, retry_count, payload";
