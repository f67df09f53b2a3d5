//! Integration tests for the read-only API.

mod common;

use axum::http::StatusCode;
use meridian_core::event::RiskLevel;
use meridian_test_support::{FixedClock, asset_created, compliance_audit, fixed_time};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_published_asset_is_visible_in_register() {
    // Arrange
    let (services, _log) = common::build_services();
    services
        .bus
        .publish_and_wait(asset_created("AST-001", &FixedClock(fixed_time())))
        .await
        .unwrap();
    let app = common::build_test_app(&services);

    // Act
    let (status, json) = common::get_json(app, "/api/v1/assets/AST-001").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["asset_number"], "AST-001");
    assert_eq!(json["status"], "ACTIVE");
    assert_eq!(json["net_book_value"], 4_500_000);
}

#[tokio::test]
async fn test_unknown_asset_returns_404() {
    let (services, _log) = common::build_services();
    let app = common::build_test_app(&services);

    let (status, json) = common::get_json(app, "/api/v1/assets/AST-404").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "asset_not_found");
}

#[tokio::test]
async fn test_get_event_returns_stored_envelope() {
    // Arrange
    let (services, _log) = common::build_services();
    let (stored, _) = services
        .bus
        .publish_and_wait(asset_created("AST-001", &FixedClock(fixed_time())))
        .await
        .unwrap();
    let app = common::build_test_app(&services);

    // Act
    let (status, json) =
        common::get_json(app, &format!("/api/v1/events/{}", stored.event_id)).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["event_type"], "AssetCreatedEvent");
    assert_eq!(json["aggregate_id"], "AST-001");
    assert_eq!(json["processed"], true);
}

#[tokio::test]
async fn test_missing_event_returns_404() {
    let (services, _log) = common::build_services();
    let app = common::build_test_app(&services);

    let (status, json) =
        common::get_json(app, &format!("/api/v1/events/{}", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "event_not_found");
}

#[tokio::test]
async fn test_compliance_report_over_window() {
    // Arrange
    let (services, _log) = common::build_services();
    let clock = FixedClock(fixed_time());
    services
        .bus
        .publish_and_wait(compliance_audit("GDPR", Some(RiskLevel::Low), false, &clock))
        .await
        .unwrap();
    services
        .bus
        .publish_and_wait(compliance_audit("INTERNAL", Some(RiskLevel::Low), true, &clock))
        .await
        .unwrap();
    let app = common::build_test_app(&services);

    // Act
    let (status, json) = common::get_json(
        app,
        "/api/v1/reports/compliance?from=2026-09-01T00:00:00Z&to=2026-10-31T23:59:59Z",
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 2);
    assert_eq!(json["by_compliance_type"], json!({"GDPR": 1, "INTERNAL": 1}));
    assert_eq!(json["high_priority"], 2);
    assert_eq!(json["open_remediations"], 1);
}

#[tokio::test]
async fn test_inverted_report_window_returns_400() {
    let (services, _log) = common::build_services();
    let app = common::build_test_app(&services);

    let (status, json) = common::get_json(
        app,
        "/api/v1/reports/compliance?from=2026-10-31T00:00:00Z&to=2026-10-01T00:00:00Z",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}
