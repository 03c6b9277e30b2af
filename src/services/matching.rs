//! FIFO Matching Engine
//!
//! Pure, deterministic matching for a single instrument key: given every
//! trade sharing one key, produce the complete realized-P&L event sequence
//! and the residual open-lot queue. No IO, no clocks. The ledger service
//! re-runs this from scratch whenever a trade for the key is added, edited,
//! or deleted, and re-matching the same trade set always yields identical
//! output.

use std::collections::VecDeque;

use crate::types::{
    InstrumentKey, Lot, LotDirection, MatchedLeg, RealizedPnlEvent, Trade, TradeAction,
};

/// The derived state for one instrument key after matching.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchOutcome {
    /// Realized-P&L events in close order
    pub events: Vec<RealizedPnlEvent>,
    /// Residual open lots, oldest first
    pub lots: Vec<Lot>,
}

impl MatchOutcome {
    /// True when the key is flat with no realized history.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.lots.is_empty()
    }
}

/// Match all trades for one instrument key.
///
/// Trades are processed in (timestamp, insertion-seq) order regardless of
/// the order they arrive in, so the result is independent of submission
/// order. Oversell is not an error: quantity beyond the open interest flips
/// into a new lot of the opposite direction.
pub fn match_trades(key: &InstrumentKey, trades: &[Trade]) -> MatchOutcome {
    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));

    let mut queue: VecDeque<Lot> = VecDeque::new();
    let mut events: Vec<RealizedPnlEvent> = Vec::new();

    for trade in ordered {
        apply_trade(key, trade, &mut queue, &mut events);
    }

    MatchOutcome {
        events,
        lots: queue.into_iter().collect(),
    }
}

fn trade_direction(trade: &Trade) -> LotDirection {
    match trade.action {
        TradeAction::Buy => LotDirection::Long,
        TradeAction::Sell => LotDirection::Short,
    }
}

/// Per-unit cost for a lot opened by `trade`, with the opening fee share
/// folded in. The fee is added for long lots and subtracted for short lots
/// so that it reduces realized profit on the eventual close either way.
fn open_unit_cost(trade: &Trade, direction: LotDirection) -> f64 {
    let fee_per_unit = trade.fee / trade.quantity as f64;
    trade.price + direction.sign() * fee_per_unit / trade.multiplier as f64
}

fn apply_trade(
    key: &InstrumentKey,
    trade: &Trade,
    queue: &mut VecDeque<Lot>,
    events: &mut Vec<RealizedPnlEvent>,
) {
    let direction = trade_direction(trade);

    // Same direction as the open interest (or nothing open): the whole
    // trade opens a new lot at the queue tail.
    let closing = matches!(queue.front(), Some(front) if front.direction != direction);
    if !closing {
        queue.push_back(Lot {
            open_trade_id: trade.id,
            remaining_quantity: trade.quantity,
            unit_cost: open_unit_cost(trade, direction),
            opened_at: trade.timestamp,
            direction,
        });
        return;
    }

    // Closing trade: consume lots from the front, oldest first.
    let fee_per_unit = trade.fee / trade.quantity as f64;
    let multiplier = trade.multiplier as f64;
    let mut remaining = trade.quantity;
    let mut legs: Vec<MatchedLeg> = Vec::new();

    while remaining > 0 {
        let Some(lot) = queue.front_mut() else { break };

        let matched = lot.remaining_quantity.min(remaining);
        let gross =
            (trade.price - lot.unit_cost) * multiplier * matched as f64 * lot.direction.sign();
        let realized = gross - fee_per_unit * matched as f64;

        legs.push(MatchedLeg {
            open_trade_id: lot.open_trade_id,
            matched_quantity: matched,
            open_unit_cost: lot.unit_cost,
            close_unit_price: trade.price,
            realized_amount: realized,
        });

        remaining -= matched;
        if lot.remaining_quantity == matched {
            queue.pop_front();
        } else {
            lot.remaining_quantity -= matched;
        }
    }

    // Conservation: every closing unit is either matched or flipped.
    let matched_total: u32 = legs.iter().map(|l| l.matched_quantity).sum();
    debug_assert_eq!(matched_total + remaining, trade.quantity);

    if !legs.is_empty() {
        events.push(RealizedPnlEvent {
            close_trade_id: trade.id,
            instrument_key: key.clone(),
            closed_at: trade.timestamp,
            legs,
        });
    }

    // Oversell/short-flip: the excess opens a lot in the trade's own
    // direction. Its unit cost carries this trade's per-unit fee share.
    if remaining > 0 {
        queue.push_back(Lot {
            open_trade_id: trade.id,
            remaining_quantity: remaining,
            unit_cost: trade.price + direction.sign() * fee_per_unit / multiplier,
            opened_at: trade.timestamp,
            direction,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstrumentType, NewTrade, OptionType};
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn equity_key(symbol: &str) -> InstrumentKey {
        InstrumentKey {
            symbol: symbol.into(),
            instrument_type: InstrumentType::Equity,
            option_type: None,
            strike_cents: None,
            expiration: None,
        }
    }

    fn trade(
        seq: i64,
        action: TradeAction,
        quantity: u32,
        price: f64,
        fee: f64,
        day: u32,
    ) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            seq,
            symbol: "AAPL".into(),
            instrument_type: InstrumentType::Equity,
            option_type: None,
            strike: None,
            expiration: None,
            action,
            quantity,
            price,
            multiplier: 1,
            fee,
            timestamp: Utc.with_ymd_and_hms(2024, 6, day, 14, 30, 0).unwrap(),
            notes: String::new(),
            created_at: Utc::now(),
        }
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "expected {b}, got {a}");
    }

    #[test]
    fn round_trip_realizes_98() {
        // BUY 10 @ $100 (fee $1), SELL 10 @ $110 (fee $1)
        let trades = vec![
            trade(1, TradeAction::Buy, 10, 100.0, 1.0, 1),
            trade(2, TradeAction::Sell, 10, 110.0, 1.0, 2),
        ];
        let out = match_trades(&equity_key("AAPL"), &trades);

        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].matched_quantity(), 10);
        approx(out.events[0].realized_amount(), 98.0);
        assert!(out.lots.is_empty());
    }

    #[test]
    fn partial_close_flips_short() {
        // BUY 5 @ $100, SELL 8 @ $110: match 5, flip 3 into a short lot
        let trades = vec![
            trade(1, TradeAction::Buy, 5, 100.0, 0.0, 1),
            trade(2, TradeAction::Sell, 8, 110.0, 0.0, 2),
        ];
        let out = match_trades(&equity_key("AAPL"), &trades);

        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].matched_quantity(), 5);
        approx(out.events[0].realized_amount(), 50.0);

        assert_eq!(out.lots.len(), 1);
        let flip = &out.lots[0];
        assert_eq!(flip.direction, LotDirection::Short);
        assert_eq!(flip.remaining_quantity, 3);
        approx(flip.unit_cost, 110.0);
        // Conservation: matched + flipped == closing quantity
        assert_eq!(out.events[0].matched_quantity() + flip.remaining_quantity, 8);
    }

    #[test]
    fn option_contract_realizes_48() {
        // BUY 1 AAPL $150 CALL @ $2.50 (x100, fee $1), SELL @ $3.00 (fee $1)
        let key = InstrumentKey {
            symbol: "AAPL".into(),
            instrument_type: InstrumentType::Option,
            option_type: Some(OptionType::Call),
            strike_cents: Some(15000),
            expiration: NaiveDate::from_ymd_opt(2024, 12, 20),
        };
        let mut open = trade(1, TradeAction::Buy, 1, 2.5, 1.0, 1);
        let mut close = trade(2, TradeAction::Sell, 1, 3.0, 1.0, 2);
        for t in [&mut open, &mut close] {
            t.instrument_type = InstrumentType::Option;
            t.option_type = Some(OptionType::Call);
            t.strike = Some(150.0);
            t.expiration = NaiveDate::from_ymd_opt(2024, 12, 20);
            t.multiplier = 100;
        }

        let out = match_trades(&key, &[open, close]);
        assert_eq!(out.events.len(), 1);
        approx(out.events[0].realized_amount(), 48.0);
    }

    #[test]
    fn pure_short_open_then_cover() {
        // SELL with nothing open starts a short; a later BUY covers it
        let trades = vec![
            trade(1, TradeAction::Sell, 10, 110.0, 1.0, 1),
            trade(2, TradeAction::Buy, 10, 100.0, 1.0, 2),
        ];
        let out = match_trades(&equity_key("AAPL"), &trades);

        assert_eq!(out.events.len(), 1);
        approx(out.events[0].realized_amount(), 98.0);
        assert!(out.lots.is_empty());
    }

    #[test]
    fn fifo_consumes_oldest_lot_first() {
        let trades = vec![
            trade(1, TradeAction::Buy, 5, 100.0, 0.0, 1),
            trade(2, TradeAction::Buy, 5, 120.0, 0.0, 2),
            trade(3, TradeAction::Sell, 5, 130.0, 0.0, 3),
        ];
        let out = match_trades(&equity_key("AAPL"), &trades);

        // The $100 lot goes first: (130-100)*5 = 150
        assert_eq!(out.events.len(), 1);
        approx(out.events[0].realized_amount(), 150.0);

        assert_eq!(out.lots.len(), 1);
        approx(out.lots[0].unit_cost, 120.0);
        assert_eq!(out.lots[0].remaining_quantity, 5);
    }

    #[test]
    fn close_spans_multiple_lots() {
        let trades = vec![
            trade(1, TradeAction::Buy, 4, 100.0, 0.0, 1),
            trade(2, TradeAction::Buy, 6, 110.0, 0.0, 2),
            trade(3, TradeAction::Sell, 10, 120.0, 2.0, 3),
        ];
        let out = match_trades(&equity_key("AAPL"), &trades);

        assert_eq!(out.events.len(), 1);
        let event = &out.events[0];
        assert_eq!(event.legs.len(), 2);
        assert_eq!(event.legs[0].matched_quantity, 4);
        assert_eq!(event.legs[1].matched_quantity, 6);
        // (120-100)*4 + (120-110)*6 - 2 = 80 + 60 - 2 = 138
        approx(event.realized_amount(), 138.0);
        assert!(out.lots.is_empty());
    }

    #[test]
    fn partially_consumed_lot_keeps_unit_cost() {
        let trades = vec![
            trade(1, TradeAction::Buy, 10, 100.0, 2.0, 1),
            trade(2, TradeAction::Sell, 4, 105.0, 0.0, 2),
        ];
        let out = match_trades(&equity_key("AAPL"), &trades);

        assert_eq!(out.lots.len(), 1);
        assert_eq!(out.lots[0].remaining_quantity, 6);
        // Fee was prorated per unit at open; the residual keeps the same cost
        approx(out.lots[0].unit_cost, 100.2);
    }

    #[test]
    fn rematch_is_idempotent() {
        let trades = vec![
            trade(1, TradeAction::Buy, 5, 100.0, 1.0, 1),
            trade(2, TradeAction::Sell, 8, 110.0, 1.0, 2),
            trade(3, TradeAction::Buy, 3, 105.0, 0.5, 3),
        ];
        let key = equity_key("AAPL");
        let first = match_trades(&key, &trades);
        let second = match_trades(&key, &trades);
        assert_eq!(first, second);
    }

    #[test]
    fn result_is_independent_of_submission_order() {
        let a = trade(1, TradeAction::Buy, 5, 100.0, 1.0, 1);
        let b = trade(2, TradeAction::Sell, 5, 110.0, 1.0, 2);
        let c = trade(3, TradeAction::Buy, 2, 108.0, 0.0, 3);

        let key = equity_key("AAPL");
        let in_order = match_trades(&key, &[a.clone(), b.clone(), c.clone()]);
        let shuffled = match_trades(&key, &[c, a, b]);
        assert_eq!(in_order, shuffled);
    }

    #[test]
    fn equal_timestamps_break_ties_by_seq() {
        let open = trade(1, TradeAction::Buy, 5, 100.0, 0.0, 1);
        let mut close = trade(2, TradeAction::Sell, 5, 110.0, 0.0, 1);
        close.timestamp = open.timestamp;

        let close_id = close.id;
        let out = match_trades(&equity_key("AAPL"), &[close, open]);
        // seq 1 (the buy) sorts first, so the sell closes it
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].close_trade_id, close_id);
        assert!(out.lots.is_empty());
    }

    #[test]
    fn no_trades_no_state() {
        let out = match_trades(&equity_key("AAPL"), &[]);
        assert!(out.is_empty());
    }

    #[test]
    fn same_direction_trades_accumulate_lots() {
        let trades = vec![
            trade(1, TradeAction::Buy, 5, 100.0, 0.0, 1),
            trade(2, TradeAction::Buy, 3, 101.0, 0.0, 2),
        ];
        let out = match_trades(&equity_key("AAPL"), &trades);
        assert!(out.events.is_empty());
        assert_eq!(out.lots.len(), 2);
        assert_eq!(out.lots[0].remaining_quantity, 5);
        assert_eq!(out.lots[1].remaining_quantity, 3);
    }

    // NewTrade is exercised end-to-end in the ledger service tests; this
    // keeps the type from silently losing serde coverage.
    #[test]
    fn new_trade_deserializes_with_defaults() {
        let json = r#"{
            "symbol": "AAPL",
            "instrumentType": "equity",
            "action": "buy",
            "quantity": 10,
            "price": 100.0,
            "timestamp": "2024-06-01T14:30:00Z"
        }"#;
        let parsed: NewTrade = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.fee, 0.0);
        assert!(parsed.multiplier.is_none());
        assert!(parsed.option_type.is_none());
    }
}
