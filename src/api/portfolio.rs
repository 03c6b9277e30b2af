//! Portfolio Snapshot API
//!
//! - GET /api/portfolio - Snapshot history with day-over-day deltas
//! - POST /api/portfolio - Record (or overwrite) a day's total value

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::types::{PortfolioSnapshot, SnapshotEntry};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_history))
        .route("/", post(record_snapshot))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<SnapshotEntry>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(state.config.default_snapshot_limit)
        .min(1000);
    let history = state
        .snapshots
        .history(limit)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(history))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordRequest {
    /// Defaults to today (UTC)
    date: Option<NaiveDate>,
    total_value: f64,
    notes: Option<String>,
}

async fn record_snapshot(
    State(state): State<AppState>,
    Json(request): Json<RecordRequest>,
) -> Result<(StatusCode, Json<PortfolioSnapshot>), AppError> {
    if !request.total_value.is_finite() {
        return Err(AppError::BadRequest(
            "totalValue must be a finite number".into(),
        ));
    }
    let date = request.date.unwrap_or_else(|| Utc::now().date_naive());
    let snapshot = state
        .snapshots
        .record(date, request.total_value, request.notes)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}
