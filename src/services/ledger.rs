//! Trade Ledger Service
//!
//! Owns the trade lifecycle: validation, persistence, and the derived
//! matching state. Any mutation (submit, edit, delete) re-matches every
//! trade sharing the affected instrument key from scratch and atomically
//! publishes the new outcome, so readers always see a state consistent
//! with some complete trade set. A per-key lock serializes writers for
//! the same key; trades for different keys never contend.

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::matching::{match_trades, MatchOutcome};
use super::positions::position_from_lots;
use super::rollups::{self, DaySummary, PerformanceMetrics};
use super::sqlite_store::SqliteStore;
use crate::types::{
    InstrumentKey, InstrumentType, NewTrade, PnlPeriod, Position, RealizedPnlEvent, Trade,
    TradePatch,
};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("trade not found")]
    TradeNotFound,
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> LedgerError {
    LedgerError::Validation {
        field,
        reason: reason.into(),
    }
}

pub struct LedgerService {
    sqlite: Arc<SqliteStore>,
    /// Published matching outcome per instrument key. Swapped whole, never
    /// mutated in place.
    derived: DashMap<InstrumentKey, Arc<MatchOutcome>>,
    /// One writer at a time per key.
    key_locks: DashMap<InstrumentKey, Arc<Mutex<()>>>,
}

impl LedgerService {
    pub fn new(sqlite: Arc<SqliteStore>) -> Self {
        Self {
            sqlite,
            derived: DashMap::new(),
            key_locks: DashMap::new(),
        }
    }

    /// Rebuild every instrument key's derived state from the stored trade
    /// set. Called once at startup.
    pub fn rebuild_all(&self) -> Result<(), LedgerError> {
        let trades = self.sqlite.all_trades()?;
        let mut keys: Vec<InstrumentKey> = trades.iter().map(|t| t.instrument_key()).collect();
        keys.sort_by_key(|k| k.to_string());
        keys.dedup();

        for key in &keys {
            self.rematch_key(key)?;
        }
        info!(
            trades = trades.len(),
            keys = keys.len(),
            "Rebuilt ledger state from store"
        );
        Ok(())
    }

    // ========== Mutations ==========

    /// Validate and record a new trade, then re-match its instrument key.
    pub fn submit_trade(&self, new: NewTrade) -> Result<Trade, LedgerError> {
        let mut trade = Trade {
            id: Uuid::new_v4(),
            seq: 0,
            symbol: new.symbol.trim().to_ascii_uppercase(),
            instrument_type: new.instrument_type,
            option_type: new.option_type,
            strike: new.strike,
            expiration: new.expiration,
            action: new.action,
            quantity: new.quantity,
            price: new.price,
            multiplier: new
                .multiplier
                .unwrap_or_else(|| new.instrument_type.default_multiplier()),
            fee: new.fee,
            timestamp: new.timestamp,
            notes: new.notes.unwrap_or_default(),
            created_at: Utc::now(),
        };
        validate_shape(&trade)?;

        let key = trade.instrument_key();
        let lock = self.key_lock(&key);
        let _guard = lock.lock().unwrap();
        trade.seq = self.sqlite.insert_trade(&trade)?;
        self.rematch_key_locked(&key)?;

        debug!(id = %trade.id, key = %key, "Trade recorded");
        Ok(trade)
    }

    /// Apply a partial update to an existing trade and re-match both the
    /// old and (if the key changed) the new instrument key.
    pub fn edit_trade(&self, id: Uuid, patch: TradePatch) -> Result<Trade, LedgerError> {
        let original = self.sqlite.get_trade(id)?.ok_or(LedgerError::TradeNotFound)?;
        let old_key = original.instrument_key();

        let mut trade = original;
        if let Some(symbol) = patch.symbol {
            trade.symbol = symbol.trim().to_ascii_uppercase();
        }
        if let Some(instrument_type) = patch.instrument_type {
            trade.instrument_type = instrument_type;
        }
        if let Some(option_type) = patch.option_type {
            trade.option_type = option_type;
        }
        if let Some(strike) = patch.strike {
            trade.strike = strike;
        }
        if let Some(expiration) = patch.expiration {
            trade.expiration = expiration;
        }
        if let Some(action) = patch.action {
            trade.action = action;
        }
        if let Some(quantity) = patch.quantity {
            trade.quantity = quantity;
        }
        if let Some(price) = patch.price {
            trade.price = price;
        }
        if let Some(multiplier) = patch.multiplier {
            trade.multiplier = multiplier;
        }
        if let Some(fee) = patch.fee {
            trade.fee = fee;
        }
        if let Some(timestamp) = patch.timestamp {
            trade.timestamp = timestamp;
        }
        if let Some(notes) = patch.notes {
            trade.notes = notes;
        }
        validate_shape(&trade)?;

        let new_key = trade.instrument_key();
        {
            let lock = self.key_lock(&old_key);
            let _guard = lock.lock().unwrap();
            if !self.sqlite.update_trade(&trade)? {
                return Err(LedgerError::TradeNotFound);
            }
            self.rematch_key_locked(&old_key)?;
        }
        if new_key != old_key {
            self.rematch_key(&new_key)?;
        }

        debug!(id = %trade.id, key = %new_key, "Trade edited");
        Ok(trade)
    }

    /// Remove a trade and re-match its instrument key.
    pub fn delete_trade(&self, id: Uuid) -> Result<(), LedgerError> {
        let trade = self.sqlite.get_trade(id)?.ok_or(LedgerError::TradeNotFound)?;
        let key = trade.instrument_key();

        let lock = self.key_lock(&key);
        let _guard = lock.lock().unwrap();
        if !self.sqlite.delete_trade(id)? {
            return Err(LedgerError::TradeNotFound);
        }
        self.rematch_key_locked(&key)?;

        debug!(id = %id, key = %key, "Trade deleted");
        Ok(())
    }

    // ========== Re-matching ==========

    fn key_lock(&self, key: &InstrumentKey) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn rematch_key(&self, key: &InstrumentKey) -> Result<(), LedgerError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap();
        self.rematch_key_locked(key)
    }

    /// Recompute and publish one key's outcome. Caller holds the key lock.
    fn rematch_key_locked(&self, key: &InstrumentKey) -> Result<(), LedgerError> {
        let trades: Vec<Trade> = self
            .sqlite
            .trades_for_symbol(&key.symbol)?
            .into_iter()
            .filter(|t| &t.instrument_key() == key)
            .collect();

        let outcome = match_trades(key, &trades);
        if outcome.is_empty() {
            self.derived.remove(key);
        } else {
            self.derived.insert(key.clone(), Arc::new(outcome));
        }
        Ok(())
    }

    // ========== Read APIs ==========

    /// Every open position, sorted by instrument for stable output.
    pub fn open_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .derived
            .iter()
            .filter_map(|entry| position_from_lots(entry.key(), &entry.value().lots))
            .collect();
        positions.sort_by_key(|p| p.instrument_key.to_string());
        positions
    }

    /// Every realized-P&L event across all keys, in close order.
    pub fn events(&self) -> Vec<RealizedPnlEvent> {
        let mut events: Vec<RealizedPnlEvent> = self
            .derived
            .iter()
            .flat_map(|entry| entry.value().events.clone())
            .collect();
        events.sort_by_key(|e| (e.closed_at, e.close_trade_id));
        events
    }

    /// Realized P&L for the period containing `reference`.
    pub fn realized_pnl(&self, period: PnlPeriod, reference: NaiveDate) -> f64 {
        rollups::realized_in_period(&self.events(), period, reference)
    }

    /// Performance statistics over the whole realized-event stream.
    pub fn metrics(&self, reference: NaiveDate) -> PerformanceMetrics {
        rollups::performance_metrics(&self.events(), reference)
    }

    /// Per-day realized summaries for one calendar month.
    pub fn calendar(&self, year: i32, month: u32) -> Vec<DaySummary> {
        rollups::month_calendar(&self.events(), year, month)
    }

    pub fn recent_trades(&self, limit: usize) -> Result<Vec<Trade>, LedgerError> {
        Ok(self.sqlite.recent_trades(limit)?)
    }

    pub fn trade_count(&self) -> Result<i64, LedgerError> {
        Ok(self.sqlite.trade_count()?)
    }
}

/// Field-level validation shared by submit and edit paths.
fn validate_shape(trade: &Trade) -> Result<(), LedgerError> {
    if trade.symbol.is_empty() {
        return Err(invalid("symbol", "must not be empty"));
    }
    if trade.quantity == 0 {
        return Err(invalid("quantity", "must be positive"));
    }
    if !trade.price.is_finite() {
        return Err(invalid("price", "must be a finite number"));
    }
    if !trade.fee.is_finite() || trade.fee < 0.0 {
        return Err(invalid("fee", "must be a non-negative finite number"));
    }
    if trade.multiplier == 0 {
        return Err(invalid("multiplier", "must be at least 1"));
    }
    match trade.instrument_type {
        InstrumentType::Option => {
            if trade.option_type.is_none() {
                return Err(invalid("optionType", "required for option trades"));
            }
            if trade.strike.is_none() {
                return Err(invalid("strike", "required for option trades"));
            }
            if trade.expiration.is_none() {
                return Err(invalid("expiration", "required for option trades"));
            }
            if let Some(strike) = trade.strike {
                if !strike.is_finite() || strike <= 0.0 {
                    return Err(invalid("strike", "must be a positive number"));
                }
            }
        }
        InstrumentType::Equity => {
            if trade.option_type.is_some() || trade.strike.is_some() || trade.expiration.is_some()
            {
                return Err(invalid(
                    "instrumentType",
                    "equity trades must not carry option fields",
                ));
            }
        }
    }
    Ok(())
}
