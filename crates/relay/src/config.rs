//! Application configuration loaded from environment variables.

use std::time::Duration;

use dispatcher::DispatcherConfig;

/// Relay configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `DATABASE_URL` — Postgres connection string (required)
/// - `PUBLISH_URL` — webhook endpoint events are POSTed to (required)
/// - `DISPATCH_WORKERS` — dispatcher task count (default: `2`)
/// - `POLL_INTERVAL_MS`, `BATCH_SIZE`, `MAX_RETRIES`, `PUBLISH_TIMEOUT_MS`,
///   `BASE_BACKOFF_MS`, `MAX_BACKOFF_MS`, `STALE_AFTER_MS`,
///   `SWEEP_INTERVAL_MS` — dispatcher tuning knobs
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub publish_url: String,
    pub dispatch_workers: usize,
    pub dispatcher: DispatcherConfig,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults. Fails only when a required variable is missing.
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL is not set".to_string())?;
        let publish_url =
            std::env::var("PUBLISH_URL").map_err(|_| "PUBLISH_URL is not set".to_string())?;

        let defaults = DispatcherConfig::default();
        let dispatcher = DispatcherConfig {
            poll_interval: env_duration_ms("POLL_INTERVAL_MS", defaults.poll_interval),
            batch_size: env_parse("BATCH_SIZE", defaults.batch_size),
            max_retries: env_parse("MAX_RETRIES", defaults.max_retries),
            publish_timeout: env_duration_ms("PUBLISH_TIMEOUT_MS", defaults.publish_timeout),
            base_backoff: env_duration_ms("BASE_BACKOFF_MS", defaults.base_backoff),
            max_backoff: env_duration_ms("MAX_BACKOFF_MS", defaults.max_backoff),
            stale_after: env_duration_ms("STALE_AFTER_MS", defaults.stale_after),
            sweep_interval: env_duration_ms("SWEEP_INTERVAL_MS", defaults.sweep_interval),
        };

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            database_url,
            publish_url,
            dispatch_workers: env_parse("DISPATCH_WORKERS", 2),
            dispatcher,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
