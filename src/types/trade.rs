//! Trade Types
//!
//! The canonical trade record consumed by the matching engine, plus the
//! request shapes (new trade, patch) and the instrument key used to
//! partition matching.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Instrument class of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    /// Shares of stock
    Equity,
    /// Options contracts
    Option,
}

impl InstrumentType {
    /// Default contract multiplier for this instrument class.
    pub fn default_multiplier(&self) -> u32 {
        match self {
            InstrumentType::Equity => 1,
            InstrumentType::Option => 100,
        }
    }
}

impl std::fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentType::Equity => write!(f, "equity"),
            InstrumentType::Option => write!(f, "option"),
        }
    }
}

/// Option contract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// Direction of a fill. Broker OPEN/CLOSE labels are normalized to BUY/SELL
/// at the edge; the open-versus-close role of a trade is decided by matching,
/// never by the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    /// Normalize a source label (BUY/OPEN/SELL/CLOSE, any case) to an action.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "BUY" | "OPEN" | "BTO" | "BTC" => Some(TradeAction::Buy),
            "SELL" | "CLOSE" | "STC" | "STO" => Some(TradeAction::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

// =============================================================================
// Trade
// =============================================================================

/// A single validated trade record. Immutable once matched; edits and
/// deletes go through the ledger service, which re-matches the affected
/// instrument key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Unique trade ID, stable for the trade's lifetime
    pub id: Uuid,
    /// Insertion sequence, tie-breaker for equal timestamps
    pub seq: i64,
    /// Underlying ticker (uppercase)
    pub symbol: String,
    /// Instrument class
    pub instrument_type: InstrumentType,
    /// Call/put, present iff instrument_type is Option
    pub option_type: Option<OptionType>,
    /// Strike price, present iff instrument_type is Option
    pub strike: Option<f64>,
    /// Contract expiration, present iff instrument_type is Option
    pub expiration: Option<NaiveDate>,
    /// Fill direction
    pub action: TradeAction,
    /// Number of shares/contracts, always positive
    pub quantity: u32,
    /// Price per unit, pre-multiplier
    pub price: f64,
    /// Contract multiplier (100 for standard options, 1 for equities)
    pub multiplier: u32,
    /// Transaction cost attributed to this single trade
    pub fee: f64,
    /// Fill time; the sole FIFO ordering key
    pub timestamp: DateTime<Utc>,
    /// Free text, not interpreted by the engine
    pub notes: String,
    /// Record creation time
    pub created_at: DateTime<Utc>,
}

impl Trade {
    /// Derive the grouping key used to partition matching.
    pub fn instrument_key(&self) -> InstrumentKey {
        InstrumentKey {
            symbol: self.symbol.clone(),
            instrument_type: self.instrument_type,
            option_type: self.option_type,
            strike_cents: self.strike.map(strike_to_cents),
            expiration: self.expiration,
        }
    }
}

/// Strike prices are carried in the key as integer cents so the key can be
/// hashed and compared exactly.
pub fn strike_to_cents(strike: f64) -> i64 {
    (strike * 100.0).round() as i64
}

// =============================================================================
// Instrument Key
// =============================================================================

/// The identity trades are grouped under for matching. Two trades match
/// only if their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentKey {
    pub symbol: String,
    pub instrument_type: InstrumentType,
    pub option_type: Option<OptionType>,
    pub strike_cents: Option<i64>,
    pub expiration: Option<NaiveDate>,
}

impl std::fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.option_type, self.strike_cents, self.expiration) {
            (Some(ot), Some(cents), Some(exp)) => write!(
                f,
                "{} {} {} {}",
                self.symbol,
                cents as f64 / 100.0,
                ot,
                exp
            ),
            _ => write!(f, "{}", self.symbol),
        }
    }
}

// =============================================================================
// Request Shapes
// =============================================================================

/// A trade submission before validation. Produced by the manual-entry API
/// and by the CSV normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrade {
    pub symbol: String,
    pub instrument_type: InstrumentType,
    #[serde(default)]
    pub option_type: Option<OptionType>,
    #[serde(default)]
    pub strike: Option<f64>,
    #[serde(default)]
    pub expiration: Option<NaiveDate>,
    pub action: TradeAction,
    pub quantity: u32,
    pub price: f64,
    /// Defaults by instrument type when omitted (100 for options, 1 for equities)
    #[serde(default)]
    pub multiplier: Option<u32>,
    #[serde(default)]
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Distinguishes an absent field from an explicit `null`: absent stays
/// `None`, `null` becomes `Some(None)` (clear the field).
fn clearable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Partial update for an existing trade. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePatch {
    pub symbol: Option<String>,
    pub instrument_type: Option<InstrumentType>,
    /// `null` clears the field (e.g. when switching to equity)
    #[serde(default, deserialize_with = "clearable")]
    pub option_type: Option<Option<OptionType>>,
    #[serde(default, deserialize_with = "clearable")]
    pub strike: Option<Option<f64>>,
    #[serde(default, deserialize_with = "clearable")]
    pub expiration: Option<Option<NaiveDate>>,
    pub action: Option<TradeAction>,
    pub quantity: Option<u32>,
    pub price: Option<f64>,
    pub multiplier: Option<u32>,
    pub fee: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}
