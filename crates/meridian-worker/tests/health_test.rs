//! Integration tests for the health and readiness endpoints.

mod common;

use axum::http::StatusCode;
use meridian_test_support::{FixedClock, asset_created, fixed_time};

#[tokio::test]
async fn test_health_returns_200_with_status_ok() {
    let (services, _log) = common::build_services();
    let app = common::build_test_app(&services);

    let (status, json) = common::get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_ready_reports_stored_event_count() {
    // Arrange
    let (services, _log) = common::build_services();
    services
        .bus
        .publish_and_wait(asset_created("AST-001", &FixedClock(fixed_time())))
        .await
        .unwrap();
    let app = common::build_test_app(&services);

    // Act
    let (status, json) = common::get_json(app, "/ready").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ready");
    assert_eq!(json["stored_events"], 1);
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (services, _log) = common::build_services();
    let app = common::build_test_app(&services);

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/v1/nonexistent")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
