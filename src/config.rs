use std::env;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database path.
    pub database_path: String,
    /// Default number of trades returned by list endpoints.
    pub default_trade_limit: usize,
    /// Default number of snapshots returned by the portfolio history.
    pub default_snapshot_limit: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3001);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "tally.db".to_string()),
            default_trade_limit: env::var("DEFAULT_TRADE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            default_snapshot_limit: env::var("DEFAULT_SNAPSHOT_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(90),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // Only assert fields no test environment is expected to override
        let config = Config::from_env();
        assert!(!config.host.is_empty());
        assert!(config.default_trade_limit > 0);
        assert!(config.default_snapshot_limit > 0);
    }
}
