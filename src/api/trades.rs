//! Trade Ledger API
//!
//! Endpoints for the trade log and its derived views:
//!
//! Trades:
//! - GET /api/trades - List recent trades
//! - POST /api/trades - Record a new trade
//! - PUT /api/trades/:id - Edit a trade (re-matches its instrument)
//! - DELETE /api/trades/:id - Delete a trade (re-matches its instrument)
//! - POST /api/trades/import - Import a broker CSV export
//!
//! Derived views:
//! - GET /api/positions - Open positions
//! - GET /api/pnl - Realized P&L for a period
//! - GET /api/metrics - Performance statistics
//! - GET /api/calendar - Per-day realized P&L for one month

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::normalizer::{self, RowError};
use crate::services::{DaySummary, LedgerError, PerformanceMetrics};
use crate::types::{NewTrade, PnlPeriod, Position, Trade, TradePatch};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trades", get(list_trades))
        .route("/trades", post(record_trade))
        .route("/trades/:id", put(edit_trade))
        .route("/trades/:id", delete(delete_trade))
        .route("/trades/import", post(import_trades))
        .route("/positions", get(list_positions))
        .route("/pnl", get(get_pnl))
        .route("/metrics", get(get_metrics))
        .route("/calendar", get(get_calendar))
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

/// Convert LedgerError to HTTP response.
impl IntoResponse for LedgerError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            LedgerError::Validation { .. } => (StatusCode::BAD_REQUEST, "INVALID_TRADE"),
            LedgerError::TradeNotFound => (StatusCode::NOT_FOUND, "TRADE_NOT_FOUND"),
            LedgerError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code,
            }),
        )
            .into_response()
    }
}

// =============================================================================
// Trades
// =============================================================================

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn list_trades(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Trade>>, LedgerError> {
    let limit = query
        .limit
        .unwrap_or(state.config.default_trade_limit)
        .min(1000);
    Ok(Json(state.ledger.recent_trades(limit)?))
}

async fn record_trade(
    State(state): State<AppState>,
    Json(new): Json<NewTrade>,
) -> Result<(StatusCode, Json<Trade>), LedgerError> {
    let trade = state.ledger.submit_trade(new)?;
    Ok((StatusCode::CREATED, Json(trade)))
}

async fn edit_trade(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<TradePatch>,
) -> Result<Json<Trade>, LedgerError> {
    Ok(Json(state.ledger.edit_trade(id, patch)?))
}

async fn delete_trade(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, LedgerError> {
    state.ledger.delete_trade(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// CSV Import
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportResponse {
    imported: usize,
    failed: Vec<RowError>,
}

async fn import_trades(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let (rows, mut failed) = match normalizer::parse_csv(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: err.to_string(),
                    code: "INVALID_CSV",
                }),
            )
                .into_response();
        }
    };

    let total = rows.len();
    let mut imported = 0;
    for (idx, row) in rows.into_iter().enumerate() {
        match state.ledger.submit_trade(row) {
            Ok(_) => imported += 1,
            Err(err) => failed.push(RowError {
                row: idx + 1,
                reason: err.to_string(),
            }),
        }
    }
    tracing::info!(imported, total, "CSV import complete");

    Json(ImportResponse { imported, failed }).into_response()
}

// =============================================================================
// Derived Views
// =============================================================================

async fn list_positions(State(state): State<AppState>) -> Json<Vec<Position>> {
    Json(state.ledger.open_positions())
}

#[derive(Debug, Deserialize)]
struct PnlQuery {
    period: Option<PnlPeriod>,
    /// Reference date; defaults to today (UTC)
    date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PnlResponse {
    period: PnlPeriod,
    reference: NaiveDate,
    realized: f64,
}

async fn get_pnl(State(state): State<AppState>, Query(query): Query<PnlQuery>) -> Json<PnlResponse> {
    let period = query.period.unwrap_or(PnlPeriod::Day);
    let reference = query.date.unwrap_or_else(|| Utc::now().date_naive());
    Json(PnlResponse {
        period,
        reference,
        realized: state.ledger.realized_pnl(period, reference),
    })
}

async fn get_metrics(
    State(state): State<AppState>,
    Query(query): Query<PnlQuery>,
) -> Json<PerformanceMetrics> {
    let reference = query.date.unwrap_or_else(|| Utc::now().date_naive());
    Json(state.ledger.metrics(reference))
}

#[derive(Debug, Deserialize)]
struct CalendarQuery {
    year: Option<i32>,
    month: Option<u32>,
}

async fn get_calendar(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> Json<Vec<DaySummary>> {
    let today = Utc::now().date_naive();
    let year = query.year.unwrap_or_else(|| today.year());
    let month = query.month.unwrap_or_else(|| today.month());
    Json(state.ledger.calendar(year, month))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = LedgerError::Validation {
            field: "quantity",
            reason: "must be positive".into(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_trade_maps_to_not_found() {
        let response = LedgerError::TradeNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
