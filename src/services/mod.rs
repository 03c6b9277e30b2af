//! Business logic: the FIFO matching engine, the trade ledger around it,
//! derived views (positions, rollups), CSV import, snapshots, and the
//! SQLite persistence layer.

pub mod ledger;
pub mod matching;
pub mod normalizer;
pub mod positions;
pub mod rollups;
pub mod snapshots;
pub mod sqlite_store;

pub use ledger::{LedgerError, LedgerService};
pub use matching::{match_trades, MatchOutcome};
pub use normalizer::{parse_csv, ImportError, RowError};
pub use rollups::{DaySummary, PerformanceMetrics};
pub use snapshots::SnapshotLog;
pub use sqlite_store::SqliteStore;
