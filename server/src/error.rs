//! Error types for the OmeroFS monitor server.
//!
//! [`ServerError`] covers every failure a remote watch client can observe.
//! Each variant has a stable machine-readable [`code`](ServerError::code)
//! that the HTTP layer returns next to the human-readable message.
//!
//! Delivery failures are not here: a notification that cannot reach its
//! watcher is logged and dropped, and never surfaces as an error to a client.

use std::path::PathBuf;

use omerofs_monitor::error::MonitorError;
use omerofs_monitor::types::MonitorId;
use thiserror::Error;

use crate::config::ConfigError;

/// Top-level error type for the monitor server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The requested monitor type tag is not recognised.
    #[error("unknown monitor type: {0}")]
    UnknownMonitorType(String),

    /// No monitor is registered under this id.
    #[error("unknown monitor id: {0}")]
    UnknownMonitorId(MonitorId),

    /// The monitor could not be built; nothing was registered.
    #[error("failed to create monitor: {0}")]
    MonitorCreation(#[source] MonitorError),

    /// The monitor could not be started.
    #[error("failed to start monitor: {0}")]
    MonitorStart(#[source] MonitorError),

    /// The monitor could not be stopped cleanly.
    #[error("failed to stop monitor: {0}")]
    MonitorStop(#[source] MonitorError),

    /// The registry already holds the maximum number of monitors.
    #[error("monitor limit of {max} reached")]
    AtCapacity {
        /// Configured maximum.
        max: usize,
    },

    /// A path is malformed or lies outside the monitor's root.
    #[error("invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// A directory filter is not a valid glob pattern.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A callback URL is not an absolute http(s) URL.
    #[error("invalid callback url: {0}")]
    InvalidCallbackUrl(String),

    /// Failed to read from the file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error during server initialization.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to build the HTTP client used for callbacks.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl ServerError {
    /// Returns the machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownMonitorType(_) => "unknown_monitor_type",
            Self::UnknownMonitorId(_) => "unknown_monitor_id",
            Self::MonitorCreation(_) => "monitor_creation_failed",
            Self::MonitorStart(_) => "monitor_start_failed",
            Self::MonitorStop(_) => "monitor_stop_failed",
            Self::AtCapacity { .. } => "at_capacity",
            Self::InvalidPath(_) => "invalid_path",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::InvalidCallbackUrl(_) => "invalid_callback_url",
            Self::Io(_) | Self::Config(_) | Self::HttpClient(_) => "internal_error",
        }
    }
}

/// A specialized `Result` type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
