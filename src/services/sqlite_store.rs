//! SQLite persistence layer for trades and portfolio snapshots.
//!
//! The trade table is the single source of truth: every derived structure
//! (lots, realized events, positions, rollups) is rebuilt from it by the
//! matching engine and never written back. The `seq` rowid doubles as the
//! insertion-order tie-breaker for trades with equal timestamps; editing a
//! trade preserves its `seq`, and deleted sequence numbers are never reused.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{PortfolioSnapshot, Trade};

/// Columns selected for every trade query, in `trade_from_row` order.
const TRADE_COLUMNS: &str = "seq, id, symbol, instrument_type, option_type, strike, \
     expiration, action, quantity, price, multiplier, fee, timestamp, notes, created_at";

/// SQLite store for trade records and daily portfolio snapshots.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        // AUTOINCREMENT keeps seq monotonic across deletes and restarts
        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                symbol TEXT NOT NULL,
                instrument_type TEXT NOT NULL,
                option_type TEXT,
                strike REAL,
                expiration TEXT,
                action TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price REAL NOT NULL,
                multiplier INTEGER NOT NULL,
                fee REAL NOT NULL,
                timestamp TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_timestamp ON trades(timestamp DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS portfolio_snapshots (
                date TEXT PRIMARY KEY,
                total_value REAL NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                recorded_at TEXT NOT NULL
            )",
            [],
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    // ========== Trade Methods ==========

    /// Insert a trade and return it with its assigned insertion sequence.
    pub fn insert_trade(&self, trade: &Trade) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO trades (id, symbol, instrument_type, option_type, strike,
                expiration, action, quantity, price, multiplier, fee, timestamp,
                notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                trade.id.to_string(),
                trade.symbol,
                trade.instrument_type.to_string(),
                trade.option_type.map(|t| t.to_string()),
                trade.strike,
                trade.expiration.map(|d| d.to_string()),
                trade.action.to_string(),
                trade.quantity,
                trade.price,
                trade.multiplier,
                trade.fee,
                trade.timestamp.to_rfc3339(),
                trade.notes,
                trade.created_at.to_rfc3339(),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a trade by ID. Returns `Ok(None)` when no such trade exists.
    pub fn get_trade(&self, id: Uuid) -> Result<Option<Trade>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id.to_string()], trade_from_row)?;
        rows.next().transpose()
    }

    /// Overwrite a trade's mutable fields. The `seq` column is part of the
    /// primary key and is left untouched, so edits keep their tie-break
    /// position. Returns false when the trade does not exist.
    pub fn update_trade(&self, trade: &Trade) -> Result<bool, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        let changed = conn.execute(
            "UPDATE trades SET symbol = ?2, instrument_type = ?3, option_type = ?4,
                strike = ?5, expiration = ?6, action = ?7, quantity = ?8,
                price = ?9, multiplier = ?10, fee = ?11, timestamp = ?12, notes = ?13
             WHERE id = ?1",
            params![
                trade.id.to_string(),
                trade.symbol,
                trade.instrument_type.to_string(),
                trade.option_type.map(|t| t.to_string()),
                trade.strike,
                trade.expiration.map(|d| d.to_string()),
                trade.action.to_string(),
                trade.quantity,
                trade.price,
                trade.multiplier,
                trade.fee,
                trade.timestamp.to_rfc3339(),
                trade.notes,
            ],
        )?;

        Ok(changed > 0)
    }

    /// Delete a trade by ID. Returns false when the trade does not exist.
    pub fn delete_trade(&self, id: Uuid) -> Result<bool, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM trades WHERE id = ?1", params![id.to_string()])?;
        Ok(changed > 0)
    }

    /// All trades for one symbol, insertion order. The caller narrows down
    /// to an exact instrument key in memory; SQL filters on symbol only to
    /// avoid comparing REAL strike columns.
    pub fn trades_for_symbol(&self, symbol: &str) -> Result<Vec<Trade>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE symbol = ?1 ORDER BY seq"
        ))?;
        let rows = stmt.query_map(params![symbol], trade_from_row)?;
        rows.collect()
    }

    /// Every trade in the ledger, insertion order.
    pub fn all_trades(&self) -> Result<Vec<Trade>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades ORDER BY seq"
        ))?;
        let rows = stmt.query_map([], trade_from_row)?;
        rows.collect()
    }

    /// Most recently filled trades, newest first.
    pub fn recent_trades(&self, limit: usize) -> Result<Vec<Trade>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades ORDER BY timestamp DESC, seq DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], trade_from_row)?;
        rows.collect()
    }

    /// Total number of stored trades.
    pub fn trade_count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))
    }

    // ========== Snapshot Methods ==========

    /// Record the portfolio value for a day. Re-recording the same date
    /// overwrites the earlier value (last-write-wins).
    pub fn upsert_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO portfolio_snapshots (date, total_value, notes, recorded_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(date) DO UPDATE SET
                total_value = excluded.total_value,
                notes = excluded.notes,
                recorded_at = excluded.recorded_at",
            params![
                snapshot.date.to_string(),
                snapshot.total_value,
                snapshot.notes,
                snapshot.recorded_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Most recent snapshots, newest first.
    pub fn recent_snapshots(&self, limit: usize) -> Result<Vec<PortfolioSnapshot>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT date, total_value, notes, recorded_at
             FROM portfolio_snapshots ORDER BY date DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], snapshot_from_row)?;
        rows.collect()
    }

    /// The nearest snapshot recorded strictly before `date`, if any. Used
    /// for day-over-day deltas, which skip unrecorded days.
    pub fn snapshot_before(&self, date: NaiveDate) -> Result<Option<PortfolioSnapshot>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT date, total_value, notes, recorded_at
             FROM portfolio_snapshots WHERE date < ?1 ORDER BY date DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![date.to_string()], snapshot_from_row)?;
        rows.next().transpose()
    }
}

// ========== Row Conversion ==========

fn conversion_err(idx: usize, msg: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.to_string().into())
}

fn parse_utc(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| conversion_err(idx, "invalid RFC 3339 timestamp"))
}

fn trade_from_row(row: &Row<'_>) -> Result<Trade, rusqlite::Error> {
    use crate::types::{InstrumentType, OptionType, TradeAction};

    let id_raw: String = row.get(1)?;
    let instrument_raw: String = row.get(3)?;
    let option_raw: Option<String> = row.get(4)?;
    let expiration_raw: Option<String> = row.get(6)?;
    let action_raw: String = row.get(7)?;
    let timestamp_raw: String = row.get(12)?;
    let created_raw: String = row.get(14)?;

    let instrument_type = match instrument_raw.as_str() {
        "equity" => InstrumentType::Equity,
        "option" => InstrumentType::Option,
        _ => return Err(conversion_err(3, "unknown instrument type")),
    };
    let option_type = match option_raw.as_deref() {
        None => None,
        Some("call") => Some(OptionType::Call),
        Some("put") => Some(OptionType::Put),
        Some(_) => return Err(conversion_err(4, "unknown option type")),
    };
    let action = match action_raw.as_str() {
        "buy" => TradeAction::Buy,
        "sell" => TradeAction::Sell,
        _ => return Err(conversion_err(7, "unknown trade action")),
    };
    let expiration = expiration_raw
        .map(|raw| {
            raw.parse::<NaiveDate>()
                .map_err(|_| conversion_err(6, "invalid expiration date"))
        })
        .transpose()?;

    Ok(Trade {
        seq: row.get(0)?,
        id: id_raw
            .parse()
            .map_err(|_| conversion_err(1, "invalid trade UUID"))?,
        symbol: row.get(2)?,
        instrument_type,
        option_type,
        strike: row.get(5)?,
        expiration,
        action,
        quantity: row.get(8)?,
        price: row.get(9)?,
        multiplier: row.get(10)?,
        fee: row.get(11)?,
        timestamp: parse_utc(12, &timestamp_raw)?,
        notes: row.get(13)?,
        created_at: parse_utc(14, &created_raw)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> Result<PortfolioSnapshot, rusqlite::Error> {
    let date_raw: String = row.get(0)?;
    let recorded_raw: String = row.get(3)?;

    Ok(PortfolioSnapshot {
        date: date_raw
            .parse()
            .map_err(|_| conversion_err(0, "invalid snapshot date"))?,
        total_value: row.get(1)?,
        notes: row.get(2)?,
        recorded_at: parse_utc(3, &recorded_raw)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstrumentType, OptionType, TradeAction};
    use chrono::TimeZone;

    fn sample_trade(symbol: &str, action: TradeAction) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            seq: 0,
            symbol: symbol.into(),
            instrument_type: InstrumentType::Equity,
            option_type: None,
            strike: None,
            expiration: None,
            action,
            quantity: 10,
            price: 100.0,
            multiplier: 1,
            fee: 1.0,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 14, 30, 0).unwrap(),
            notes: "test fill".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn trade_crud_round_trip() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut trade = sample_trade("AAPL", TradeAction::Buy);
        trade.seq = store.insert_trade(&trade).unwrap();
        assert!(trade.seq > 0);

        let loaded = store.get_trade(trade.id).unwrap().unwrap();
        assert_eq!(loaded, trade);

        let mut edited = loaded.clone();
        edited.price = 101.5;
        edited.notes = "corrected fill".into();
        assert!(store.update_trade(&edited).unwrap());

        let reloaded = store.get_trade(trade.id).unwrap().unwrap();
        assert_eq!(reloaded.price, 101.5);
        assert_eq!(reloaded.seq, trade.seq);

        assert!(store.delete_trade(trade.id).unwrap());
        assert!(store.get_trade(trade.id).unwrap().is_none());
        assert!(!store.delete_trade(trade.id).unwrap());
    }

    #[test]
    fn option_fields_survive_storage() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut trade = sample_trade("AAPL", TradeAction::Buy);
        trade.instrument_type = InstrumentType::Option;
        trade.option_type = Some(OptionType::Put);
        trade.strike = Some(432.55);
        trade.expiration = NaiveDate::from_ymd_opt(2024, 12, 20);
        trade.multiplier = 100;
        trade.seq = store.insert_trade(&trade).unwrap();

        let loaded = store.get_trade(trade.id).unwrap().unwrap();
        assert_eq!(loaded, trade);
        assert_eq!(loaded.instrument_key(), trade.instrument_key());
    }

    #[test]
    fn seq_is_never_reused_after_delete() {
        let store = SqliteStore::new_in_memory().unwrap();
        let first = sample_trade("AAPL", TradeAction::Buy);
        let first_seq = store.insert_trade(&first).unwrap();
        store.delete_trade(first.id).unwrap();

        let second = sample_trade("AAPL", TradeAction::Buy);
        let second_seq = store.insert_trade(&second).unwrap();
        assert!(second_seq > first_seq);
    }

    #[test]
    fn symbol_query_preserves_insertion_order() {
        let store = SqliteStore::new_in_memory().unwrap();
        for _ in 0..3 {
            let trade = sample_trade("TSLA", TradeAction::Buy);
            store.insert_trade(&trade).unwrap();
        }
        store
            .insert_trade(&sample_trade("AAPL", TradeAction::Sell))
            .unwrap();

        let trades = store.trades_for_symbol("TSLA").unwrap();
        assert_eq!(trades.len(), 3);
        assert!(trades.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(store.trade_count().unwrap(), 4);
    }

    #[test]
    fn snapshot_upsert_is_last_write_wins() {
        let store = SqliteStore::new_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let first = PortfolioSnapshot {
            date,
            total_value: 10_000.0,
            notes: String::new(),
            recorded_at: Utc::now(),
        };
        store.upsert_snapshot(&first).unwrap();
        store
            .upsert_snapshot(&PortfolioSnapshot {
                total_value: 10_250.0,
                ..first.clone()
            })
            .unwrap();

        let snapshots = store.recent_snapshots(10).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].total_value, 10_250.0);
    }

    #[test]
    fn snapshot_before_skips_unrecorded_days() {
        let store = SqliteStore::new_in_memory().unwrap();
        let day1 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let day3 = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();

        store
            .upsert_snapshot(&PortfolioSnapshot {
                date: day1,
                total_value: 10_000.0,
                notes: String::new(),
                recorded_at: Utc::now(),
            })
            .unwrap();

        // Day 2 was never recorded; day 3 compares against day 1
        let prior = store.snapshot_before(day3).unwrap().unwrap();
        assert_eq!(prior.date, day1);
        assert!(store.snapshot_before(day1).unwrap().is_none());
    }

    #[test]
    fn on_disk_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.db");

        let trade = sample_trade("AAPL", TradeAction::Buy);
        {
            let store = SqliteStore::new(&path).unwrap();
            store.insert_trade(&trade).unwrap();
        }

        let reopened = SqliteStore::new(&path).unwrap();
        assert!(reopened.get_trade(trade.id).unwrap().is_some());
    }
}
