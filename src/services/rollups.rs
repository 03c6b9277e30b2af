//! Realized-P&L Rollups
//!
//! Periodic sums, performance statistics, and the month calendar view. All
//! figures are recomputed on demand from the realized-event stream; nothing
//! here keeps running totals, so every rollup automatically reflects edits
//! and deletes after the affected key is re-matched.
//!
//! Events are bucketed by the UTC calendar date of the closing trade.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{PnlPeriod, RealizedPnlEvent};

/// (ISO year, ISO week) bucket key.
type WeekKey = (i32, u32);

fn event_date(event: &RealizedPnlEvent) -> NaiveDate {
    event.closed_at.date_naive()
}

fn week_key(date: NaiveDate) -> WeekKey {
    let week = date.iso_week();
    (week.year(), week.week())
}

/// Sum of realized P&L for the period containing `reference`.
/// `PnlPeriod::All` ignores the reference entirely.
pub fn realized_in_period(
    events: &[RealizedPnlEvent],
    period: PnlPeriod,
    reference: NaiveDate,
) -> f64 {
    events
        .iter()
        .filter(|e| {
            let date = event_date(e);
            match period {
                PnlPeriod::Day => date == reference,
                PnlPeriod::Week => week_key(date) == week_key(reference),
                PnlPeriod::Month => {
                    date.year() == reference.year() && date.month() == reference.month()
                }
                PnlPeriod::All => true,
            }
        })
        .map(|e| e.realized_amount())
        .sum()
}

/// Realized P&L per calendar day, sorted ascending by date.
pub fn daily_totals(events: &[RealizedPnlEvent]) -> BTreeMap<NaiveDate, f64> {
    let mut totals = BTreeMap::new();
    for event in events {
        *totals.entry(event_date(event)).or_insert(0.0) += event.realized_amount();
    }
    totals
}

/// Realized P&L per ISO week.
pub fn weekly_totals(events: &[RealizedPnlEvent]) -> BTreeMap<WeekKey, f64> {
    let mut totals = BTreeMap::new();
    for event in events {
        *totals.entry(week_key(event_date(event))).or_insert(0.0) += event.realized_amount();
    }
    totals
}

/// Realized P&L per (year, month).
pub fn monthly_totals(events: &[RealizedPnlEvent]) -> BTreeMap<(i32, u32), f64> {
    let mut totals = BTreeMap::new();
    for event in events {
        let date = event_date(event);
        *totals.entry((date.year(), date.month())).or_insert(0.0) += event.realized_amount();
    }
    totals
}

/// All-time realized P&L.
pub fn all_time(events: &[RealizedPnlEvent]) -> f64 {
    events.iter().map(|e| e.realized_amount()).sum()
}

// =============================================================================
// Performance Metrics
// =============================================================================

/// Aggregate performance statistics over the realized-event stream. Each
/// event (one closing trade) counts as one "trade" for win/loss purposes,
/// matching how traders read a closed-trade log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub day_pnl: f64,
    pub week_pnl: f64,
    pub month_pnl: f64,
    pub all_time_pnl: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Winners / total closed, 0.0 when nothing closed
    pub win_rate: f64,
    /// Gross wins / gross losses; None when there are no losses
    pub profit_factor: Option<f64>,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// win_rate * avg_win - loss_rate * avg_loss
    pub expectancy: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

pub fn performance_metrics(events: &[RealizedPnlEvent], reference: NaiveDate) -> PerformanceMetrics {
    let mut winning = 0usize;
    let mut losing = 0usize;
    let mut gross_wins = 0.0f64;
    let mut gross_losses = 0.0f64;
    let mut largest_win = 0.0f64;
    let mut largest_loss = 0.0f64;

    for event in events {
        let amount = event.realized_amount();
        if amount > 0.0 {
            winning += 1;
            gross_wins += amount;
            largest_win = largest_win.max(amount);
        } else if amount < 0.0 {
            losing += 1;
            gross_losses += -amount;
            largest_loss = largest_loss.min(amount);
        }
    }

    let total = events.len();
    let win_rate = if total > 0 {
        winning as f64 / total as f64
    } else {
        0.0
    };
    let loss_rate = if total > 0 {
        losing as f64 / total as f64
    } else {
        0.0
    };
    let avg_win = if winning > 0 {
        gross_wins / winning as f64
    } else {
        0.0
    };
    let avg_loss = if losing > 0 {
        gross_losses / losing as f64
    } else {
        0.0
    };
    let profit_factor = if gross_losses > 0.0 {
        Some(gross_wins / gross_losses)
    } else {
        None
    };

    PerformanceMetrics {
        day_pnl: realized_in_period(events, PnlPeriod::Day, reference),
        week_pnl: realized_in_period(events, PnlPeriod::Week, reference),
        month_pnl: realized_in_period(events, PnlPeriod::Month, reference),
        all_time_pnl: all_time(events),
        total_trades: total,
        winning_trades: winning,
        losing_trades: losing,
        win_rate,
        profit_factor,
        avg_win,
        avg_loss,
        expectancy: win_rate * avg_win - loss_rate * avg_loss,
        largest_win,
        largest_loss,
    }
}

// =============================================================================
// Calendar View
// =============================================================================

/// One day of the month calendar: realized total plus the number of closing
/// events recognized on that day.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: NaiveDate,
    pub realized: f64,
    pub event_count: usize,
}

/// Per-day summaries for one calendar month, one entry for every day of the
/// month. Days with no realized events carry a zero total. Out-of-range
/// months yield an empty vec.
pub fn month_calendar(events: &[RealizedPnlEvent], year: i32, month: u32) -> Vec<DaySummary> {
    let mut totals: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for event in events {
        let date = event_date(event);
        if date.year() == year && date.month() == month {
            let entry = totals.entry(date).or_insert((0.0, 0));
            entry.0 += event.realized_amount();
            entry.1 += 1;
        }
    }

    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|date| {
            let (realized, event_count) = totals.get(&date).copied().unwrap_or((0.0, 0));
            DaySummary {
                date,
                realized,
                event_count,
            }
        })
        .collect()
}
