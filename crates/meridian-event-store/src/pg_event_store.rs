//! `PostgreSQL` implementation of the `EventStore` trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use meridian_core::error::DomainError;
use meridian_core::event::{
    AUDIT_EVENT_TYPES, AUDIT_TRAIL_EVENT_TYPE, COMPLIANCE_AUDIT_EVENT_TYPE,
    ENTITY_STATE_CHANGED_EVENT_TYPE, DomainEvent, EventEnvelope,
};
use meridian_core::repository::EventStore;

use crate::schema::EVENT_COLUMNS;

/// One `domain_events` row.
#[derive(Debug, FromRow)]
struct EventRow {
    event_id: Uuid,
    event_type: String,
    aggregate_id: String,
    aggregate_type: String,
    occurred_on: DateTime<Utc>,
    version: i32,
    correlation_id: Option<Uuid>,
    processed: bool,
    retry_count: i32,
    payload: serde_json::Value,
}

impl TryFrom<EventRow> for DomainEvent {
    type Error = DomainError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        DomainEvent::try_from(EventEnvelope {
            event_id: row.event_id,
            event_type: row.event_type,
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            occurred_on: row.occurred_on,
            version: row.version,
            correlation_id: row.correlation_id,
            processed: row.processed,
            retry_count: row.retry_count,
            payload: row.payload,
        })
    }
}

fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

fn into_events(rows: Vec<EventRow>) -> Result<Vec<DomainEvent>, DomainError> {
    rows.into_iter().map(DomainEvent::try_from).collect()
}

/// Inserts one event through any Postgres executor.
async fn insert_event<'e, E>(executor: E, event: &DomainEvent) -> Result<(), DomainError>
where
    E: PgExecutor<'e>,
{
    event.ensure_persistable()?;
    let payload = event.kind.to_payload()?;

    sqlx::query(
        "INSERT INTO domain_events \
         (event_id, event_type, aggregate_id, aggregate_type, occurred_on, version, \
          correlation_id, processed, retry_count, payload) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(event.event_id)
    .bind(event.event_type())
    .bind(&event.aggregate_id)
    .bind(&event.aggregate_type)
    .bind(event.occurred_on)
    .bind(event.version)
    .bind(event.correlation_id)
    .bind(event.processed)
    .bind(event.retry_count)
    .bind(payload)
    .execute(executor)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return DomainError::DuplicateEvent(event.event_id);
            }
        }
        infrastructure(e)
    })?;

    Ok(())
}

/// PostgreSQL-backed event store.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Appends `event` on a connection the caller controls, so the append
    /// commits or rolls back with the caller's business write.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidEventKind` for events without aggregate
    /// linkage, `DomainError::DuplicateEvent` if the id already exists, and
    /// `DomainError::Infrastructure` for database failures.
    pub async fn store_in_transaction(
        &self,
        conn: &mut PgConnection,
        event: &DomainEvent,
    ) -> Result<DomainEvent, DomainError> {
        insert_event(&mut *conn, event).await?;
        tracing::debug!(
            event_id = %event.event_id,
            event_type = event.event_type(),
            aggregate_id = %event.aggregate_id,
            "appended event in caller transaction"
        );
        Ok(event.clone())
    }

    async fn fetch(&self, sql: &str, bind: Bind<'_>) -> Result<Vec<DomainEvent>, DomainError> {
        let query = sqlx::query_as::<_, EventRow>(sql);
        let query = match bind {
            Bind::Aggregate(aggregate_id) => query.bind(aggregate_id.to_owned()),
            Bind::AggregateFrom(aggregate_id, from) => {
                query.bind(aggregate_id.to_owned()).bind(from)
            }
            Bind::Correlation(correlation_id) => query.bind(correlation_id),
            Bind::Entity(entity_type, entity_id, from, to) => query
                .bind(entity_type.to_owned())
                .bind(entity_id.to_owned())
                .bind(from)
                .bind(to)
                .bind(AUDIT_TRAIL_EVENT_TYPE)
                .bind(ENTITY_STATE_CHANGED_EVENT_TYPE),
            Bind::Window(from, to) => query
                .bind(from)
                .bind(to)
                .bind(COMPLIANCE_AUDIT_EVENT_TYPE),
        };
        let rows = query.fetch_all(&self.pool).await.map_err(infrastructure)?;
        into_events(rows)
    }
}

/// Parameter sets for the read queries.
enum Bind<'a> {
    Aggregate(&'a str),
    AggregateFrom(&'a str, DateTime<Utc>),
    Correlation(Uuid),
    Entity(&'a str, &'a str, DateTime<Utc>, DateTime<Utc>),
    Window(DateTime<Utc>, DateTime<Utc>),
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn store(&self, event: &DomainEvent) -> Result<DomainEvent, DomainError> {
        insert_event(&self.pool, event).await?;
        tracing::debug!(
            event_id = %event.event_id,
            event_type = event.event_type(),
            aggregate_id = %event.aggregate_id,
            "appended event"
        );
        Ok(event.clone())
    }

    async fn find_by_event_id(&self, event_id: Uuid) -> Result<Option<DomainEvent>, DomainError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM domain_events WHERE event_id = $1");
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        row.map(DomainEvent::try_from).transpose()
    }

    async fn find_by_aggregate_id(
        &self,
        aggregate_id: &str,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM domain_events \
             WHERE aggregate_id = $1 ORDER BY occurred_on ASC, seq ASC"
        );
        self.fetch(&sql, Bind::Aggregate(aggregate_id)).await
    }

    async fn find_events_for_replay(
        &self,
        aggregate_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM domain_events \
             WHERE aggregate_id = $1 AND occurred_on >= $2 ORDER BY occurred_on ASC, seq ASC"
        );
        self.fetch(&sql, Bind::AggregateFrom(aggregate_id, from))
            .await
    }

    async fn find_events_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM domain_events \
             WHERE correlation_id = $1 ORDER BY occurred_on ASC, seq ASC"
        );
        self.fetch(&sql, Bind::Correlation(correlation_id)).await
    }

    async fn find_audit_trail_events(
        &self,
        entity_type: &str,
        entity_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM domain_events \
             WHERE aggregate_type = $1 AND aggregate_id = $2 \
               AND occurred_on BETWEEN $3 AND $4 \
               AND event_type IN ($5, $6) \
             ORDER BY occurred_on ASC, seq ASC"
        );
        self.fetch(&sql, Bind::Entity(entity_type, entity_id, from, to))
            .await
    }

    async fn find_compliance_audit_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, DomainError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM domain_events \
             WHERE occurred_on BETWEEN $1 AND $2 AND event_type = $3 \
             ORDER BY occurred_on ASC, seq ASC"
        );
        self.fetch(&sql, Bind::Window(from, to)).await
    }

    async fn audit_event_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<String, i64>, DomainError> {
        let audit_types: Vec<String> = AUDIT_EVENT_TYPES.iter().map(|t| (*t).to_owned()).collect();
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT event_type, COUNT(*) FROM domain_events \
             WHERE event_type = ANY($1) AND occurred_on BETWEEN $2 AND $3 \
             GROUP BY event_type",
        )
        .bind(&audit_types)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(rows.into_iter().collect())
    }

    async fn mark_as_processed(&self, event_id: Uuid) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE domain_events SET processed = TRUE WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::EventNotFound(event_id));
        }
        Ok(())
    }

    async fn remediation_triggered(&self, event_id: Uuid) -> Result<bool, DomainError> {
        let triggered: Option<bool> = sqlx::query_scalar(
            "SELECT remediation_triggered_at IS NOT NULL FROM domain_events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(triggered.unwrap_or(false))
    }

    async fn mark_remediation_triggered(&self, event_id: Uuid) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE domain_events SET remediation_triggered_at = COALESCE(remediation_triggered_at, NOW()) \
             WHERE event_id = $1",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::EventNotFound(event_id));
        }
        Ok(())
    }

    async fn increment_retry_count(&self, event_id: Uuid) -> Result<i32, DomainError> {
        let retry_count: Option<i32> = sqlx::query_scalar(
            "UPDATE domain_events SET retry_count = retry_count + 1 \
             WHERE event_id = $1 RETURNING retry_count",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;
        retry_count.ok_or(DomainError::EventNotFound(event_id))
    }

    async fn count(&self) -> Result<i64, DomainError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM domain_events")
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)
    }
}
