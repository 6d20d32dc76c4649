//! Error types for the OmeroFS monitor engine.
//!
//! This module defines the error types used throughout the monitor crate,
//! providing structured error handling with clear, human-readable messages.
//!
//! Filtering has no error type: it is a pure function over well-typed input.
//! A monitor stopping itself on timeout or inactivity is not an error either;
//! it is reported to the watcher as a synthetic system event.

use thiserror::Error;

use crate::types::MonitorState;
use crate::watch::WatchError;

/// Errors that can occur while building or driving a monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The requested monitor type tag is not recognised.
    #[error("unknown monitor type: {0}")]
    UnknownMonitorType(String),

    /// The watch spec cannot be used for the requested monitor type.
    #[error("invalid watch spec: {0}")]
    InvalidSpec(String),

    /// The platform watch could not be set up, started, or stopped.
    #[error("platform watch error: {0}")]
    Watch(#[from] WatchError),

    /// `start` was called on a monitor that is already running.
    #[error("monitor is already running")]
    AlreadyRunning,

    /// The monitor reached a state it cannot be restarted from.
    #[error("monitor cannot be restarted from state '{0}'")]
    Terminated(MonitorState),

    /// The monitor was started outside a Tokio runtime.
    #[error("no Tokio runtime available to drive the monitor")]
    NoRuntime,
}

/// Errors that can occur while handing a notification to a watcher.
///
/// Delivery is at-most-once: these errors are logged and the notification is
/// dropped. They never change the lifecycle of the monitor that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The receiving side of the notification channel is gone.
    #[error("notification channel closed")]
    ChannelClosed,

    /// The notification channel is full.
    #[error("notification queue full, dropped {dropped} events")]
    QueueFull {
        /// Number of events in the dropped notification.
        dropped: usize,
    },

    /// The remote watcher could not be reached.
    #[error("remote watcher unreachable: {0}")]
    Unreachable(String),

    /// The remote watcher answered with a non-success status.
    #[error("remote watcher rejected notification with status {status}")]
    Rejected {
        /// HTTP status code returned by the watcher.
        status: u16,
    },
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn unknown_monitor_type_display() {
        let err = MonitorError::UnknownMonitorType("weekly".to_string());
        assert_eq!(err.to_string(), "unknown monitor type: weekly");
    }

    #[test]
    fn terminated_display_names_state() {
        let err = MonitorError::Terminated(MonitorState::TimedOut);
        assert_eq!(
            err.to_string(),
            "monitor cannot be restarted from state 'timed_out'"
        );
    }

    #[test]
    fn watch_error_conversion() {
        let watch_err = WatchError::PathNotFound(PathBuf::from("/nowhere"));
        let err: MonitorError = watch_err.into();
        assert!(matches!(err, MonitorError::Watch(_)));
        assert!(err.to_string().contains("/nowhere"));
    }

    #[test]
    fn delivery_error_display() {
        assert_eq!(
            DeliveryError::ChannelClosed.to_string(),
            "notification channel closed"
        );
        assert_eq!(
            DeliveryError::QueueFull { dropped: 3 }.to_string(),
            "notification queue full, dropped 3 events"
        );
        assert_eq!(
            DeliveryError::Rejected { status: 503 }.to_string(),
            "remote watcher rejected notification with status 503"
        );
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: MonitorError = WatchError::from(io_err).into();
        assert!(err.source().is_some());
    }
}
