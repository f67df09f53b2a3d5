//! Integration tests for `PgEventStore`.
//!
//! These need a PostgreSQL instance reachable through `DATABASE_URL`; run
//! them with `cargo test -- --ignored`.

use chrono::Duration;
use meridian_core::error::DomainError;
use meridian_core::repository::EventStore;
use meridian_event_store::PgEventStore;
use meridian_test_support::{
    FixedClock, asset_created, audit_trail, compliance_audit, fixed_time,
};
use sqlx::PgPool;
use uuid::Uuid;

// --- store + find round-trip ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_store_and_find_by_event_id(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let event = asset_created("AST-001", &FixedClock(fixed_time()))
        .with_correlation_id(Uuid::new_v4());

    store.store(&event).await.unwrap();
    let loaded = store.find_by_event_id(event.event_id).await.unwrap().unwrap();

    assert!(loaded.same_fact_as(&event));
    assert!(!loaded.processed);
    assert_eq!(loaded.retry_count, 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_find_by_event_id_returns_none_for_unknown_id(pool: PgPool) {
    let store = PgEventStore::new(pool);

    let loaded = store.find_by_event_id(Uuid::new_v4()).await.unwrap();

    assert!(loaded.is_none());
}

// --- ordering ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_find_by_aggregate_id_preserves_publish_order(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let clock = FixedClock(fixed_time());
    let first = asset_created("AST-001", &clock);
    let second = audit_trail(Some("UPDATE"), "AST-001", &clock);

    store.store(&first).await.unwrap();
    store.store(&second).await.unwrap();

    let loaded = store.find_by_aggregate_id("AST-001").await.unwrap();
    let ids: Vec<Uuid> = loaded.iter().map(|e| e.event_id).collect();
    assert_eq!(ids, vec![first.event_id, second.event_id]);
}

// --- transactional append ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_store_in_transaction_rolls_back_with_caller(pool: PgPool) {
    let store = PgEventStore::new(pool.clone());
    let event = asset_created("AST-001", &FixedClock(fixed_time()));

    let mut tx = pool.begin().await.unwrap();
    store.store_in_transaction(&mut tx, &event).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(store.count().await.unwrap(), 0);
}

// --- constraints ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_event_id_is_rejected(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let event = asset_created("AST-001", &FixedClock(fixed_time()));
    store.store(&event).await.unwrap();

    let result = store.store(&event).await;

    match result {
        Err(DomainError::DuplicateEvent(id)) => assert_eq!(id, event.event_id),
        other => panic!("expected DuplicateEvent, got {other:?}"),
    }
}

// --- lifecycle ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_mark_as_processed_twice_and_increment_retry(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let event = asset_created("AST-001", &FixedClock(fixed_time()));
    store.store(&event).await.unwrap();

    store.mark_as_processed(event.event_id).await.unwrap();
    store.mark_as_processed(event.event_id).await.unwrap();
    let retries = store.increment_retry_count(event.event_id).await.unwrap();

    let loaded = store.find_by_event_id(event.event_id).await.unwrap().unwrap();
    assert!(loaded.processed);
    assert_eq!(retries, 1);
    assert_eq!(loaded.retry_count, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_remediation_marker_is_persisted(pool: PgPool) {
    let event = compliance_audit("SOX", None, true, &FixedClock(fixed_time()));
    PgEventStore::new(pool.clone()).store(&event).await.unwrap();
    PgEventStore::new(pool.clone())
        .mark_remediation_triggered(event.event_id)
        .await
        .unwrap();

    let reopened = PgEventStore::new(pool);

    assert!(reopened.remediation_triggered(event.event_id).await.unwrap());
    assert!(!reopened.remediation_triggered(Uuid::new_v4()).await.unwrap());
    assert!(matches!(
        reopened.mark_remediation_triggered(Uuid::new_v4()).await,
        Err(DomainError::EventNotFound(_))
    ));
}

// --- audit queries ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_audit_summary_counts_only_audit_types(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let clock = FixedClock(fixed_time());
    store.store(&asset_created("AST-001", &clock)).await.unwrap();
    store
        .store(&audit_trail(Some("DELETE"), "AST-001", &clock))
        .await
        .unwrap();
    store
        .store(&compliance_audit("IFRS16", None, false, &clock))
        .await
        .unwrap();

    let summary = store
        .audit_event_summary(fixed_time() - Duration::hours(1), fixed_time() + Duration::hours(1))
        .await
        .unwrap();

    assert_eq!(summary.len(), 2);
    assert_eq!(summary["AuditTrailEvent"], 1);
    assert_eq!(summary["ComplianceAuditEvent"], 1);
}
