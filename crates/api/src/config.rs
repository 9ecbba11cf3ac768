//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::EngineConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: Postgres connection string; the in-memory store is used
///   when unset
/// - `STORAGE_TIMEOUT_MS`: upper bound for each storage call (default: `5000`)
/// - `LOYALTY_REDEMPTION_RATE_CENTS`: cents per redeemed point (default: `1`)
/// - `LOYALTY_ACCRUAL_POINTS_PER_100_CENTS`: points earned per 100 cents of a
///   completed order (default: `1`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub storage_timeout_ms: u64,
    pub redemption_rate_cents: i64,
    pub accrual_points_per_100_cents: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            storage_timeout_ms: parse_var("STORAGE_TIMEOUT_MS")
                .unwrap_or(defaults.storage_timeout_ms),
            redemption_rate_cents: parse_var("LOYALTY_REDEMPTION_RATE_CENTS")
                .unwrap_or(defaults.redemption_rate_cents),
            accrual_points_per_100_cents: parse_var("LOYALTY_ACCRUAL_POINTS_PER_100_CENTS")
                .unwrap_or(defaults.accrual_points_per_100_cents),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Derives the engine tunables.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            redemption_rate_cents: self.redemption_rate_cents,
            accrual_points_per_100_cents: self.accrual_points_per_100_cents,
            storage_timeout: Duration::from_millis(self.storage_timeout_ms),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            storage_timeout_ms: 5000,
            redemption_rate_cents: 1,
            accrual_points_per_100_cents: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.storage_timeout_ms, 5000);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_engine_config() {
        let config = Config {
            storage_timeout_ms: 250,
            redemption_rate_cents: 5,
            accrual_points_per_100_cents: 2,
            ..Default::default()
        };
        let engine = config.engine();
        assert_eq!(engine.storage_timeout, Duration::from_millis(250));
        assert_eq!(engine.redemption_rate_cents, 5);
        assert_eq!(engine.accrual_points_per_100_cents, 2);
    }

    #[test]
    fn test_default_engine_matches_engine_default() {
        let engine = Config::default().engine();
        let expected = EngineConfig::default();
        assert_eq!(engine.storage_timeout, expected.storage_timeout);
        assert_eq!(engine.redemption_rate_cents, expected.redemption_rate_cents);
        assert_eq!(
            engine.accrual_points_per_100_cents,
            expected.accrual_points_per_100_cents
        );
    }
}
