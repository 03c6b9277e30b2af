//! Open Position Derivation
//!
//! Collapses an instrument key's residual lot queue into a single position
//! row. Positions are a pure view over the matching output and are never
//! stored.

use crate::types::{InstrumentKey, Lot, LotDirection, Position};

/// Derive the open position for one instrument key from its residual lots.
/// Returns `None` when the queue is empty (a fully closed key has no
/// position row at all).
pub fn position_from_lots(key: &InstrumentKey, lots: &[Lot]) -> Option<Position> {
    let first = lots.first()?;
    let direction = first.direction;
    // The queue is homogeneous by construction: a trade in the opposite
    // direction consumes lots before it can open one.
    debug_assert!(lots.iter().all(|l| l.direction == direction));

    let total_quantity: u64 = lots.iter().map(|l| l.remaining_quantity as u64).sum();
    let weighted_cost: f64 = lots
        .iter()
        .map(|l| l.unit_cost * l.remaining_quantity as f64)
        .sum();

    let signed = match direction {
        LotDirection::Long => total_quantity as i64,
        LotDirection::Short => -(total_quantity as i64),
    };

    Some(Position {
        instrument_key: key.clone(),
        net_quantity: signed,
        direction,
        avg_unit_cost: weighted_cost / total_quantity as f64,
        lot_count: lots.len(),
    })
}
