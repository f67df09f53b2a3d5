//! Shared test helpers for worker integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use meridian_core::repository::EventStore;
use meridian_event_store::InMemoryEventStore;
use meridian_log::InMemoryLog;
use tower::ServiceExt;

use meridian_worker::config::WorkerConfig;
use meridian_worker::routes;
use meridian_worker::state::AppState;
use meridian_worker::wiring::{LogBackend, Services};

/// In-memory configuration with default topic names.
pub fn in_memory_config() -> WorkerConfig {
    WorkerConfig::from_lookup(|key| (key == "MERIDIAN_IN_MEMORY").then(|| "true".to_owned()))
        .unwrap()
}

/// Wires a worker over a fresh in-memory store and log.
pub fn build_services() -> (Services, InMemoryLog) {
    let log = InMemoryLog::new();
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let services =
        Services::with_backends(in_memory_config(), store, LogBackend::InMemory(log.clone()))
            .unwrap();
    (services, log)
}

/// Builds the full app router over `services`, as `main.rs` does.
pub fn build_test_app(services: &Services) -> Router {
    routes::build_router(AppState::from_services(services))
}

/// Polls `condition` every 10ms until it holds or two seconds pass.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Async form of [`eventually`] for conditions that query a backend.
pub async fn eventually_async<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
