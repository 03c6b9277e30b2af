//! Tally - trade ledger and FIFO P&L tracking server

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

use std::sync::Arc;

use config::Config;
use services::{LedgerService, SnapshotLog, SqliteStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<LedgerService>,
    pub snapshots: Arc<SnapshotLog>,
}

impl AppState {
    /// Wire the service graph over one SQLite store and rebuild derived
    /// state from it.
    pub fn new(config: Config, sqlite: Arc<SqliteStore>) -> Result<Self, services::LedgerError> {
        let ledger = Arc::new(LedgerService::new(sqlite.clone()));
        ledger.rebuild_all()?;
        Ok(Self {
            config: Arc::new(config),
            ledger,
            snapshots: Arc::new(SnapshotLog::new(sqlite)),
        })
    }
}

// Re-export commonly used types
pub use error::AppError;
pub use types::*;
