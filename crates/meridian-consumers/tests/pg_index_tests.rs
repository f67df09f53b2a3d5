//! Integration tests for `PgDocumentIndex`.
//!
//! These need a PostgreSQL instance reachable through `DATABASE_URL`; run
//! them with `cargo test -- --ignored`.

use meridian_consumers::{DocumentIndex, PgDocumentIndex, SearchDocument};
use meridian_test_support::{FixedClock, asset_created, compliance_audit, fixed_time};
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_documents_survive_a_new_index_handle(pool: PgPool) {
    // Arrange
    let document = SearchDocument::from_event(&asset_created("AST-001", &FixedClock(fixed_time())));
    PgDocumentIndex::new(pool.clone())
        .upsert("business-events-2026.10", &document)
        .await
        .unwrap();

    // Act
    let reopened = PgDocumentIndex::new(pool);

    // Assert
    let stored = reopened
        .get("business-events-2026.10", document.event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, document);
    assert_eq!(reopened.count("business-events-2026.10").await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_upsert_replaces_and_names_are_sorted(pool: PgPool) {
    let index = PgDocumentIndex::new(pool);
    let clock = FixedClock(fixed_time());
    let mut document = SearchDocument::from_event(&asset_created("AST-001", &clock));
    index.upsert("business-events-2026.10", &document).await.unwrap();
    index
        .upsert(
            "compliance-events-2026.10",
            &SearchDocument::from_event(&compliance_audit("SOX", None, false, &clock)),
        )
        .await
        .unwrap();

    document.searchable_text = "edited".to_owned();
    index.upsert("business-events-2026.10", &document).await.unwrap();

    assert_eq!(index.count("business-events-2026.10").await.unwrap(), 1);
    assert_eq!(
        index.index_names().await.unwrap(),
        vec!["business-events-2026.10", "compliance-events-2026.10"]
    );
    let stored = index
        .get("business-events-2026.10", document.event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.searchable_text, "edited");
}
