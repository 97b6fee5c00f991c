//! Server configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use clinicops_projections::WorkerConfig;

use crate::error::AppError;

/// Everything the binary needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Pool size.
    pub database_max_connections: u32,
    /// Projection worker tuning.
    pub worker: WorkerConfig,
    /// Time between hold expiry sweeps.
    pub hold_sweep_interval: Duration,
    /// How long background tasks get to drain on shutdown.
    pub shutdown_timeout: Duration,
    /// OTLP collector; span export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// As [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL environment variable must be set".into()))?;
        let defaults = WorkerConfig::default();
        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "PORT", 3000)?,
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            worker: WorkerConfig {
                name: lookup("PROJECTION_NAME").unwrap_or(defaults.name),
                batch_size: parsed(&lookup, "PROJECTION_BATCH_SIZE", defaults.batch_size)?,
                poll_interval: millis(&lookup, "PROJECTION_POLL_INTERVAL_MS", defaults.poll_interval)?,
                drain_interval: millis(&lookup, "PROJECTION_DRAIN_INTERVAL_MS", defaults.drain_interval)?,
                error_backoff: millis(&lookup, "PROJECTION_ERROR_BACKOFF_MS", defaults.error_backoff)?,
            },
            hold_sweep_interval: Duration::from_secs(parsed(&lookup, "HOLD_SWEEP_INTERVAL_SECS", 30)?),
            shutdown_timeout: Duration::from_secs(parsed(&lookup, "SHUTDOWN_TIMEOUT_SECS", 10)?),
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.is_empty()),
        })
    }

    /// `host:port` for the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{key} must be a valid number: {e}"))),
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, AppError> {
    match lookup(key) {
        None => Ok(default),
        Some(_) => Ok(Duration::from_millis(parsed(lookup, key, 0)?)),
    }
}
