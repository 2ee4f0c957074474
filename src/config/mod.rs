//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The database URL is wrapped in secrecy::SecretString to prevent
//! log leaks.

use crate::error::{Error, Result};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,

    /// Fallback PPR when a department has no assignee on file.
    pub default_assignee_id: i64,

    /// Trailing ETA window (days) the batch sweep considers.
    pub eval_window_days: i64,
    /// Shipments per batch in the evaluation sweep.
    pub eval_batch_size: usize,

    /// Fixed delay before a failed notification is retried (seconds).
    pub notify_retry_delay_secs: i32,
    /// Upper bound on one delivery attempt (seconds).
    pub delivery_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            default_assignee_id: var_or("DEFAULT_ASSIGNEE_ID", 1)?,
            eval_window_days: var_or("EVAL_WINDOW_DAYS", 30)?,
            eval_batch_size: var_or("EVAL_BATCH_SIZE", 100)?,
            notify_retry_delay_secs: var_or("NOTIFY_RETRY_DELAY_SECS", 300)?,
            delivery_timeout_secs: var_or("DELIVERY_TIMEOUT_SECS", 30)?,
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("could not parse {name}={raw}"))),
        Err(_) => Ok(default),
    }
}
