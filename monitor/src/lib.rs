//! OmeroFS Monitor - filtered, batched file system watches.
//!
//! This crate is the engine behind the OmeroFS monitor server. A client asks
//! for a watch on a directory; the engine filters the raw operating system
//! events and delivers them in batches, according to one of three policies.
//!
//! # Overview
//!
//! ```text
//! PlatformWatch ──raw events──▶ Monitor ──PathFilter──▶ policy ──▶ Notifier
//!                                                       │
//!                                 Persistent: NotificationScheduler (size / age)
//!                                 OneShot:    first batch or "Timed out"
//!                                 Inactivity: every batch until "Inactive"
//! ```
//!
//! # Modules
//!
//! - [`types`]: Watch specs, events, monitor ids and states
//! - [`filter`]: Path filtering rules
//! - [`notifier`]: Outbound notification channel
//! - [`timer`]: Single-fire deadline timer
//! - [`scheduler`]: Notification batching
//! - [`watch`]: Platform watch capability and backends
//! - [`monitor`]: Monitor lifecycle and delivery policies
//! - [`factory`]: Construction of monitors from a type tag
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations

pub mod config;
pub mod error;
pub mod factory;
pub mod filter;
pub mod monitor;
pub mod notifier;
pub mod scheduler;
pub mod timer;
pub mod types;
pub mod watch;

pub use config::{Config, ConfigError};
pub use error::{DeliveryError, MonitorError, Result};
pub use factory::MonitorFactory;
pub use filter::PathFilter;
pub use monitor::Monitor;
pub use notifier::{Notification, Notifier};
pub use scheduler::NotificationScheduler;
pub use timer::{CancelOutcome, DeadlineTimer};
pub use types::{
    EventType, FileEvent, MonitorId, MonitorKind, MonitorState, PathMode, RawEvent, WatchSpec,
};
pub use watch::{
    BackendKind, ManualBackend, NotifyBackend, PlatformWatch, WatchBackend, WatchError,
};
