//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use reservations::ExpirationPolicy;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL` — PostgreSQL URL; unset selects the in-memory store
/// - `DB_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `STORE_TIMEOUT_MS` — deadline per store call (default: `5000`)
/// - `GUEST_RESERVATION_TTL_DAYS` — guest reservation lifetime (default: `30`)
/// - `EXPIRATION_SWEEP_INTERVAL_SECS` — time between sweeps (default: `86400`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub store_timeout_ms: u64,
    pub guest_ttl_days: i64,
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Values that fail to parse are ignored in favor of the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            store_timeout_ms: env_or("STORE_TIMEOUT_MS", defaults.store_timeout_ms),
            guest_ttl_days: env_or("GUEST_RESERVATION_TTL_DAYS", defaults.guest_ttl_days),
            sweep_interval_secs: env_or(
                "EXPIRATION_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the deadline applied to each store call.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Returns the guest expiry rules derived from this configuration.
    pub fn expiration_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy::default()
            .with_guest_ttl(chrono::Duration::days(self.guest_ttl_days))
            .with_sweep_interval(Duration::from_secs(self.sweep_interval_secs.max(1)))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            db_max_connections: 10,
            store_timeout_ms: 5000,
            guest_ttl_days: ExpirationPolicy::DEFAULT_GUEST_TTL_DAYS,
            sweep_interval_secs: ExpirationPolicy::DEFAULT_SWEEP_INTERVAL.as_secs(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
