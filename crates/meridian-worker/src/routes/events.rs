//! Stored event lookups and entity history.

use axum::extract::{Path, Query, State};
use axum::{Json, Router, routing::get};
use chrono::{DateTime, Utc};
use meridian_core::error::DomainError;
use meridian_core::event::EventEnvelope;
use meridian_eventbus::EntityHistory;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Point in time for a history lookup; defaults to now.
#[derive(Debug, Deserialize)]
pub struct AsOf {
    pub as_of: Option<DateTime<Utc>>,
}

/// GET /api/v1/events/{event_id}
async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventEnvelope>, ApiError> {
    let event = state
        .store
        .find_by_event_id(event_id)
        .await?
        .ok_or(DomainError::EventNotFound(event_id))?;
    Ok(Json(EventEnvelope::try_from(&event)?))
}

/// GET /api/v1/events/aggregate/{aggregate_id}
async fn list_aggregate_events(
    State(state): State<AppState>,
    Path(aggregate_id): Path<String>,
) -> Result<Json<Vec<EventEnvelope>>, ApiError> {
    let envelopes = state
        .store
        .find_by_aggregate_id(&aggregate_id)
        .await?
        .iter()
        .map(EventEnvelope::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(envelopes))
}

/// GET /api/v1/events/history/{entity_type}/{entity_id}?as_of=..
async fn entity_history(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Query(params): Query<AsOf>,
) -> Result<Json<EntityHistory>, ApiError> {
    let as_of = params.as_of.unwrap_or_else(Utc::now);
    let history =
        EntityHistory::reconstruct(state.store.as_ref(), &entity_type, &entity_id, as_of).await?;
    Ok(Json(history))
}

/// Returns the router for stored events.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{event_id}", get(get_event))
        .route("/aggregate/{aggregate_id}", get(list_aggregate_events))
        .route("/history/{entity_type}/{entity_id}", get(entity_history))
}
