//! HTTP routes: health probes and read-only views over the backbone.

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod assets;
pub mod events;
pub mod health;
pub mod reports;

/// Builds the full router. `main.rs` and the integration tests share it.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/assets", assets::router())
        .nest("/api/v1/events", events::router())
        .nest("/api/v1/reports", reports::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
