//! Asset register lookups.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};

use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

/// GET /api/v1/assets/{asset_number}
async fn get_asset(
    State(state): State<AppState>,
    Path(asset_number): Path<String>,
) -> Result<Response, ApiError> {
    let response = match state.assets.get(&asset_number)? {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "asset_not_found",
                message: format!("asset {asset_number} is not in the register"),
            }),
        )
            .into_response(),
    };
    Ok(response)
}

/// Returns the router for the asset register.
pub fn router() -> Router<AppState> {
    Router::new().route("/{asset_number}", get(get_asset))
}
