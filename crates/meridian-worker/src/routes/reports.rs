//! Compliance and activity reports.

use axum::extract::{Query, State};
use axum::{Json, Router, routing::get};
use chrono::{DateTime, Utc};
use meridian_consumers::{ComplianceReport, ReportAggregate};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Report window; both bounds inclusive.
#[derive(Debug, Deserialize)]
pub struct ReportWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// GET /api/v1/reports/compliance?from=..&to=..
async fn compliance_report(
    State(state): State<AppState>,
    Query(window): Query<ReportWindow>,
) -> Result<Json<ComplianceReport>, ApiError> {
    let report = ComplianceReport::generate(state.store.as_ref(), window.from, window.to).await?;
    Ok(Json(report))
}

/// GET /api/v1/reports/activity
async fn activity_report(
    State(state): State<AppState>,
) -> Result<Json<ReportAggregate>, ApiError> {
    Ok(Json(state.reporting.snapshot()?))
}

/// Returns the router for reports.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/compliance", get(compliance_report))
        .route("/activity", get(activity_report))
}
