//! Configuration module for the OmeroFS monitor engine.
//!
//! This module handles parsing engine configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `OMEROFS_BACKEND` | No | `native` | Watch backend: `native` or `poll` |
//! | `OMEROFS_POLL_INTERVAL_MS` | No | 1000 | Scan interval of the polling backend |
//! | `OMEROFS_BLOCK_SIZE` | No | 100 | Default notification block size |
//! | `OMEROFS_TIMEOUT_MS` | No | 10000 | Default notification timeout |
//! | `OMEROFS_DELIVERY_CAPACITY` | No | 1024 | Notifications queued per monitor |
//!
//! # Example
//!
//! ```no_run
//! use omerofs_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Backend: {}", config.backend);
//! ```

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::notifier::DEFAULT_DELIVERY_CAPACITY;
use crate::types::{DEFAULT_BLOCK_SIZE, DEFAULT_TIMEOUT};
use crate::watch::{BackendKind, NotifyBackend, WatchBackend};

/// Default scan interval of the polling backend (in milliseconds).
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration of the monitor engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Which notify watcher implementation to use.
    pub backend: BackendKind,

    /// Scan interval when `backend` is [`BackendKind::Poll`].
    pub poll_interval: Duration,

    /// Block size applied when a request does not name one.
    pub default_block_size: usize,

    /// Timeout applied when a request does not name one.
    pub default_timeout: Duration,

    /// Capacity of each monitor's notification channel.
    pub delivery_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            default_block_size: DEFAULT_BLOCK_SIZE,
            default_timeout: DEFAULT_TIMEOUT,
            delivery_capacity: DEFAULT_DELIVERY_CAPACITY,
        }
    }
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if any variable is set but cannot be parsed, or
    /// if a count or interval is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend = match env::var("OMEROFS_BACKEND") {
            Ok(val) => val.parse::<BackendKind>().map_err(|message| ConfigError::InvalidValue {
                key: "OMEROFS_BACKEND".to_string(),
                message,
            })?,
            Err(_) => defaults.backend,
        };

        let poll_interval = parse_positive::<u64>("OMEROFS_POLL_INTERVAL_MS")?
            .map_or(defaults.poll_interval, Duration::from_millis);

        let default_block_size =
            parse_positive::<usize>("OMEROFS_BLOCK_SIZE")?.unwrap_or(defaults.default_block_size);

        let default_timeout = parse_positive::<u64>("OMEROFS_TIMEOUT_MS")?
            .map_or(defaults.default_timeout, Duration::from_millis);

        let delivery_capacity = parse_positive::<usize>("OMEROFS_DELIVERY_CAPACITY")?
            .unwrap_or(defaults.delivery_capacity);

        Ok(Self {
            backend,
            poll_interval,
            default_block_size,
            default_timeout,
            delivery_capacity,
        })
    }

    /// Builds the watch backend described by this configuration.
    #[must_use]
    pub fn watch_backend(&self) -> Arc<dyn WatchBackend> {
        Arc::new(NotifyBackend::new(self.backend, self.poll_interval))
    }
}

/// Parses an optional positive integer variable.
fn parse_positive<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    let Ok(val) = env::var(key) else {
        return Ok(None);
    };

    let parsed = val.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected positive integer, got '{val}'"),
    })?;

    if parsed == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value must be greater than 0".to_string(),
        });
    }

    Ok(Some(parsed))
}
