//! Portfolio Snapshot Types
//!
//! One record per calendar day of total account value. Independent of the
//! trade flow; upserted directly by the user.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A stored snapshot of total portfolio value for one calendar day.
/// Re-recording the same date overwrites it (last-write-wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    /// Calendar day, unique key
    pub date: NaiveDate,
    pub total_value: f64,
    #[serde(default)]
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
}

/// A snapshot annotated with its day-over-day delta, computed against the
/// nearest earlier *recorded* day. Recording gaps are skipped silently.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub date: NaiveDate,
    pub total_value: f64,
    /// None for the oldest recorded snapshot
    pub delta: Option<f64>,
}
