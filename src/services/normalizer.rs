//! CSV Trade Import
//!
//! Normalizes broker CSV exports into trade submissions. Header names are
//! aliased (Webull's "Filled Time" and "Avg Price", generic "Side"/"Qty",
//! and so on), numeric fields tolerate "$" and thousands separators, and
//! several date formats are accepted. Rows that cannot be normalized are
//! reported individually; one bad row never aborts the batch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::types::{InstrumentType, NewTrade, OptionType, TradeAction};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unreadable CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required column: {0}")]
    MissingColumn(&'static str),
}

/// A row that failed normalization. Row numbers are 1-based and count data
/// rows, not the header.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row: usize,
    pub reason: String,
}

/// Normalize a CSV document into trade submissions plus per-row failures.
pub fn parse_csv(data: &str) -> Result<(Vec<NewTrade>, Vec<RowError>), ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data.as_bytes());

    let columns = map_headers(reader.headers()?)?;

    let mut trades = Vec::new();
    let mut errors = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                errors.push(RowError {
                    row,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        match normalize_row(&columns, &record) {
            Ok(trade) => trades.push(trade),
            Err(reason) => errors.push(RowError { row, reason }),
        }
    }

    debug!(
        imported = trades.len(),
        failed = errors.len(),
        "Normalized CSV import"
    );
    Ok((trades, errors))
}

/// Logical fields mapped to column indexes.
struct Columns {
    symbol: usize,
    action: usize,
    quantity: usize,
    price: usize,
    timestamp: usize,
    fee: Option<usize>,
    instrument_type: Option<usize>,
    option_type: Option<usize>,
    strike: Option<usize>,
    expiration: Option<usize>,
    multiplier: Option<usize>,
    notes: Option<usize>,
}

/// Lowercase and strip everything but letters, so "Filled Time" and
/// "filled_time" land on the same alias.
fn canon(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn map_headers(headers: &csv::StringRecord) -> Result<Columns, ImportError> {
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, header) in headers.iter().enumerate() {
        index.entry(canon(header)).or_insert(i);
    }
    let find = |aliases: &[&str]| aliases.iter().find_map(|a| index.get(*a).copied());

    let required = |aliases: &[&str], name: &'static str| {
        find(aliases).ok_or(ImportError::MissingColumn(name))
    };

    Ok(Columns {
        symbol: required(&["symbol", "ticker"], "symbol")?,
        action: required(&["action", "side"], "action")?,
        quantity: required(&["quantity", "qty", "contracts", "shares", "filled"], "quantity")?,
        price: required(&["price", "avgprice", "averageprice"], "price")?,
        timestamp: required(&["date", "time", "filledtime", "timestamp"], "date")?,
        fee: find(&["fee", "fees", "commission", "transactionfee"]),
        instrument_type: find(&["instrumenttype", "tradetype", "type"]),
        option_type: find(&["optiontype"]),
        strike: find(&["strike", "strikeprice"]),
        expiration: find(&["expiration", "expiry", "expirationdate"]),
        multiplier: find(&["multiplier"]),
        notes: find(&["notes", "note"]),
    })
}

fn field<'a>(record: &'a csv::StringRecord, idx: usize) -> Option<&'a str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn optional<'a>(record: &'a csv::StringRecord, idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| field(record, i))
}

/// Parse a money/number field, tolerating "$1,234.50" and "@2.50".
fn parse_number(raw: &str) -> Result<f64, String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned
        .parse()
        .map_err(|_| format!("unparseable number: {raw:?}"))
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Broker exports often append a timezone label ("EDT"); drop it
    let trimmed = raw
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .trim();
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
        }
    }
    Err(format!("unparseable date: {raw:?}"))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    Err(format!("unparseable date: {raw:?}"))
}

fn normalize_row(columns: &Columns, record: &csv::StringRecord) -> Result<NewTrade, String> {
    let symbol = field(record, columns.symbol)
        .ok_or("missing symbol")?
        .to_ascii_uppercase();

    let action_raw = field(record, columns.action).ok_or("missing action")?;
    let action =
        TradeAction::from_label(action_raw).ok_or_else(|| format!("unknown action: {action_raw:?}"))?;

    let quantity_raw = field(record, columns.quantity).ok_or("missing quantity")?;
    let quantity = parse_number(quantity_raw)?.abs().round() as u32;

    let price = parse_number(field(record, columns.price).ok_or("missing price")?)?;
    let timestamp = parse_timestamp(field(record, columns.timestamp).ok_or("missing date")?)?;

    let fee = optional(record, columns.fee)
        .map(parse_number)
        .transpose()?
        .unwrap_or(0.0);

    let option_type = match optional(record, columns.option_type) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "call" | "c" => Some(OptionType::Call),
            "put" | "p" => Some(OptionType::Put),
            other => return Err(format!("unknown option type: {other:?}")),
        },
        None => None,
    };
    let strike = optional(record, columns.strike)
        .map(parse_number)
        .transpose()?;
    let expiration = optional(record, columns.expiration)
        .map(parse_date)
        .transpose()?;

    // An explicit type column wins; otherwise any option field marks the
    // row as an option trade
    let instrument_type = match optional(record, columns.instrument_type) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "option" | "call" | "put" => InstrumentType::Option,
            "equity" | "stock" | "share" => InstrumentType::Equity,
            other => return Err(format!("unknown instrument type: {other:?}")),
        },
        None if option_type.is_some() || strike.is_some() || expiration.is_some() => {
            InstrumentType::Option
        }
        None => InstrumentType::Equity,
    };

    let multiplier = optional(record, columns.multiplier)
        .map(parse_number)
        .transpose()?
        .map(|m| m.round() as u32);

    Ok(NewTrade {
        symbol,
        instrument_type,
        option_type,
        strike,
        expiration,
        action,
        quantity,
        price,
        multiplier,
        fee,
        timestamp,
        notes: optional(record, columns.notes).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn webull_style_export_normalizes() {
        let data = "Symbol,Side,Filled,Avg Price,Filled Time,Fee\n\
                    AAPL,BUY,10,$100.00,06/03/2024 14:30:00 EDT,1.00\n\
                    aapl,SELL,10,\"$110.00\",06/04/2024 14:30:00 EDT,1.00\n";
        let (trades, errors) = parse_csv(data).unwrap();

        assert!(errors.is_empty());
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].symbol, "AAPL");
        assert_eq!(trades[0].action, TradeAction::Buy);
        assert_eq!(trades[0].quantity, 10);
        assert_eq!(trades[0].price, 100.0);
        assert_eq!(trades[0].fee, 1.0);
        assert_eq!(trades[0].instrument_type, InstrumentType::Equity);
        assert_eq!(trades[1].symbol, "AAPL");
    }

    #[test]
    fn option_rows_infer_instrument_type() {
        let data = "symbol,action,quantity,price,date,option type,strike,expiration\n\
                    AAPL,BTO,1,2.50,2024-06-03,CALL,150,2024-12-20\n";
        let (trades, errors) = parse_csv(data).unwrap();

        assert!(errors.is_empty());
        let trade = &trades[0];
        assert_eq!(trade.instrument_type, InstrumentType::Option);
        assert_eq!(trade.option_type, Some(OptionType::Call));
        assert_eq!(trade.strike, Some(150.0));
        assert_eq!(
            trade.expiration,
            NaiveDate::from_ymd_opt(2024, 12, 20)
        );
        assert_eq!(trade.action, TradeAction::Buy);
    }

    #[test]
    fn bad_rows_are_reported_not_fatal() {
        let data = "symbol,action,quantity,price,date\n\
                    AAPL,BUY,10,100.00,2024-06-03\n\
                    MSFT,HOLD,5,200.00,2024-06-03\n\
                    TSLA,SELL,5,xyz,2024-06-03\n";
        let (trades, errors) = parse_csv(data).unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].row, 2);
        assert!(errors[0].reason.contains("action"));
        assert_eq!(errors[1].row, 3);
    }

    #[test]
    fn missing_required_header_fails_whole_import() {
        let data = "ticker,side,qty,date\nAAPL,BUY,10,2024-06-03\n";
        assert!(matches!(
            parse_csv(data),
            Err(ImportError::MissingColumn("price"))
        ));
    }

    #[test]
    fn date_only_rows_parse_at_midnight_utc() {
        let data = "symbol,action,quantity,price,date\nAAPL,BUY,10,100.00,06/03/2024\n";
        let (trades, _) = parse_csv(data).unwrap();
        let ts = trades[0].timestamp;
        assert_eq!(ts.date_naive().month(), 6);
        assert_eq!(ts.date_naive().day(), 3);
        assert_eq!(ts.time(), chrono::NaiveTime::MIN);
    }
}
