//! Health and readiness endpoints.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Readiness response.
#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    /// Number of events in the store.
    pub stored_events: i64,
}

/// GET /health
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /ready
///
/// Answers 503 when the event store cannot be queried.
async fn ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, ApiError> {
    let stored_events = state.store.count().await?;
    Ok(Json(ReadyResponse {
        status: "ready".to_string(),
        stored_events,
    }))
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready))
}
