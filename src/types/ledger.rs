//! Ledger Types
//!
//! Derived matching state: open lots, realized-P&L events, and positions.
//! All of these are regenerated from the trade set by the matching engine
//! and never mutated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::trade::InstrumentKey;

/// Direction of an open lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotDirection {
    /// Opened by a BUY
    Long,
    /// Opened by a SELL
    Short,
}

impl LotDirection {
    /// Sign applied to realized P&L: +1 for long lots, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            LotDirection::Long => 1.0,
            LotDirection::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            LotDirection::Long => LotDirection::Short,
            LotDirection::Short => LotDirection::Long,
        }
    }
}

impl std::fmt::Display for LotDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LotDirection::Long => write!(f, "long"),
            LotDirection::Short => write!(f, "short"),
        }
    }
}

/// A residual open quantity at a fixed cost basis, awaiting a closing match.
/// Owned exclusively by the matching engine's per-key queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    /// The trade that opened this lot
    pub open_trade_id: Uuid,
    /// Units still open
    pub remaining_quantity: u32,
    /// Per-unit cost with the opening fee prorated in (added for long lots,
    /// subtracted for short, so fees always reduce realized profit)
    pub unit_cost: f64,
    /// Timestamp of the originating trade
    pub opened_at: DateTime<Utc>,
    pub direction: LotDirection,
}

/// One matched slice of a closing trade against a single open lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedLeg {
    pub open_trade_id: Uuid,
    pub matched_quantity: u32,
    pub open_unit_cost: f64,
    pub close_unit_price: f64,
    /// Net of both the open-fee fraction (via unit cost) and the prorated
    /// closing fee
    pub realized_amount: f64,
}

/// Realized P&L recognized by one closing trade. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizedPnlEvent {
    pub close_trade_id: Uuid,
    pub instrument_key: InstrumentKey,
    /// The closing trade's timestamp; rollups bucket by this, never by the
    /// open trade's time
    pub closed_at: DateTime<Utc>,
    pub legs: Vec<MatchedLeg>,
}

impl RealizedPnlEvent {
    /// Total realized amount across all legs.
    pub fn realized_amount(&self) -> f64 {
        self.legs.iter().map(|l| l.realized_amount).sum()
    }

    /// Total matched quantity across all legs.
    pub fn matched_quantity(&self) -> u32 {
        self.legs.iter().map(|l| l.matched_quantity).sum()
    }
}

/// A derived open position: one per instrument key with a non-empty lot
/// queue. Recomputed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub instrument_key: InstrumentKey,
    /// Net quantity, signed: positive for long, negative for short
    pub net_quantity: i64,
    pub direction: LotDirection,
    /// Weighted-average per-unit cost across remaining lots
    pub avg_unit_cost: f64,
    /// Number of lots contributing to the position
    pub lot_count: usize,
}

/// Rollup period selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlPeriod {
    Day,
    Week,
    Month,
    All,
}

impl std::fmt::Display for PnlPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PnlPeriod::Day => write!(f, "day"),
            PnlPeriod::Week => write!(f, "week"),
            PnlPeriod::Month => write!(f, "month"),
            PnlPeriod::All => write!(f, "all"),
        }
    }
}
