//! Portfolio Snapshot Log
//!
//! One total-value record per calendar day, recorded by the user, with
//! day-over-day deltas computed against the nearest earlier recorded day.
//! Unrecorded days are simply skipped; they never produce implicit zero
//! entries.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::debug;

use super::sqlite_store::SqliteStore;
use crate::types::{PortfolioSnapshot, SnapshotEntry};

pub struct SnapshotLog {
    sqlite: Arc<SqliteStore>,
}

impl SnapshotLog {
    pub fn new(sqlite: Arc<SqliteStore>) -> Self {
        Self { sqlite }
    }

    /// Record the portfolio's total value for a day. Recording the same day
    /// again overwrites the earlier value.
    pub fn record(
        &self,
        date: NaiveDate,
        total_value: f64,
        notes: Option<String>,
    ) -> Result<PortfolioSnapshot, rusqlite::Error> {
        let snapshot = PortfolioSnapshot {
            date,
            total_value,
            notes: notes.unwrap_or_default(),
            recorded_at: Utc::now(),
        };
        self.sqlite.upsert_snapshot(&snapshot)?;
        debug!(date = %date, total_value, "Recorded portfolio snapshot");
        Ok(snapshot)
    }

    /// Recent snapshots, newest first, each annotated with its delta
    /// against the nearest earlier recorded day. The oldest recorded
    /// snapshot has no delta.
    pub fn history(&self, limit: usize) -> Result<Vec<SnapshotEntry>, rusqlite::Error> {
        let snapshots = self.sqlite.recent_snapshots(limit)?;

        let mut entries = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let prior = self.sqlite.snapshot_before(snapshot.date)?;
            entries.push(SnapshotEntry {
                date: snapshot.date,
                total_value: snapshot.total_value,
                delta: prior.map(|p| snapshot.total_value - p.total_value),
            });
        }
        Ok(entries)
    }
}
