//! Core types shared by the monitor engine.
//!
//! This module defines the watch configuration captured when a monitor is
//! created ([`WatchSpec`]), the events flowing from the platform watch into a
//! monitor ([`RawEvent`]) and the notifications flowing out of it
//! ([`FileEvent`]).

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MonitorError;

/// Text carried by the synthetic event a one-shot monitor emits on expiry.
pub const TIMED_OUT: &str = "Timed out";

/// Text carried by the synthetic event an inactivity monitor emits on expiry.
pub const INACTIVE: &str = "Inactive";

/// Default notification timeout (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default notification block size.
pub const DEFAULT_BLOCK_SIZE: usize = 100;

/// The kind of file system activity an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Create,
    Modify,
    Delete,
    System,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 4] = [Self::Create, Self::Modify, Self::Delete, Self::System];

    /// Returns the lowercase name of the event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::System => "system",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "modify" => Ok(Self::Modify),
            "delete" => Ok(Self::Delete),
            "system" => Ok(Self::System),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// Whether a watch covers only the root directory or the whole tree below it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMode {
    /// Only direct children of the root are reported.
    #[default]
    Flat,
    /// The whole directory tree below the root is watched.
    Follow,
}

impl PathMode {
    /// Returns `true` if the watch recurses into subdirectories.
    #[must_use]
    pub fn is_recursive(self) -> bool {
        matches!(self, Self::Follow)
    }
}

/// Behavioral variant of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorKind {
    /// Runs until explicitly stopped, batching notifications.
    Persistent,
    /// Delivers the first batch of events (or a timeout) and stops.
    OneShot,
    /// Delivers every batch and stops after a period without activity.
    Inactivity,
}

impl MonitorKind {
    /// Returns the canonical tag for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::OneShot => "one_shot",
            Self::Inactivity => "inactivity",
        }
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistent" => Ok(Self::Persistent),
            "oneshot" | "one_shot" | "one-shot" => Ok(Self::OneShot),
            "inactivity" => Ok(Self::Inactivity),
            _ => Err(MonitorError::UnknownMonitorType(s.to_string())),
        }
    }
}

/// Opaque identifier of a monitor, unique for the lifetime of a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(String);

impl MonitorId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MonitorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MonitorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for MonitorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    /// Built but never started.
    Created,
    /// Watching for events.
    Running,
    /// Stopped by an explicit request.
    Stopped,
    /// A one-shot monitor delivered its batch and stopped itself.
    Fired,
    /// A one-shot monitor expired before any event arrived.
    TimedOut,
    /// An inactivity monitor saw no events for its timeout and stopped itself.
    Inactive,
}

impl MonitorState {
    /// Returns `true` while the monitor is watching.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` for the states a monitor reaches by stopping itself.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Fired | Self::TimedOut | Self::Inactive)
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Fired => "fired",
            Self::TimedOut => "timed_out",
            Self::Inactive => "inactive",
        };
        f.write_str(name)
    }
}

/// Immutable configuration of a single watch.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use omerofs_monitor::types::{EventType, PathMode, WatchSpec};
///
/// let spec = WatchSpec::new("/data/incoming")
///     .with_path_mode(PathMode::Follow)
///     .with_event_types([EventType::Create])
///     .with_whitelist([".jpg", ".tif"])
///     .with_timeout(Duration::from_secs(5))
///     .with_block_size(3);
///
/// assert!(spec.path_mode.is_recursive());
/// assert_eq!(spec.block_size, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSpec {
    /// Event types of interest.
    pub event_types: HashSet<EventType>,

    /// Flat or recursive watch.
    pub path_mode: PathMode,

    /// Root directory of the watch.
    pub root: PathBuf,

    /// Extensions or file names of interest; empty means everything.
    pub whitelist: Vec<String>,

    /// Subdirectory names whose contents are never reported.
    pub blacklist: Vec<String>,

    /// Drop events for operating system junk files.
    pub ignore_sys_files: bool,

    /// Drop events whose path is a directory.
    pub ignore_dir_events: bool,

    /// Flush timeout for persistent monitors, expiry for the others.
    pub timeout: Duration,

    /// Number of events that triggers an immediate flush.
    pub block_size: usize,
}

impl WatchSpec {
    /// Creates a spec for `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            event_types: [EventType::Create, EventType::Modify, EventType::Delete]
                .into_iter()
                .collect(),
            path_mode: PathMode::Flat,
            root: root.into(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            ignore_sys_files: false,
            ignore_dir_events: false,
            timeout: DEFAULT_TIMEOUT,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Replaces the event types of interest.
    pub fn with_event_types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.event_types = types.into_iter().collect();
        self
    }

    /// Sets the path mode.
    pub fn with_path_mode(mut self, mode: PathMode) -> Self {
        self.path_mode = mode;
        self
    }

    /// Replaces the root directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Replaces the whitelist.
    pub fn with_whitelist<S: Into<String>>(mut self, entries: impl IntoIterator<Item = S>) -> Self {
        self.whitelist = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the blacklist.
    pub fn with_blacklist<S: Into<String>>(mut self, entries: impl IntoIterator<Item = S>) -> Self {
        self.blacklist = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether system junk files are ignored.
    pub fn ignore_sys_files(mut self, ignore: bool) -> Self {
        self.ignore_sys_files = ignore;
        self
    }

    /// Sets whether directory events are ignored.
    pub fn ignore_dir_events(mut self, ignore: bool) -> Self {
        self.ignore_dir_events = ignore;
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the notification block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }
}

/// A file system event as reported by a platform watch.
///
/// Besides the path and type, the watch records what it observed about the
/// path at the time of the event so that filtering never touches the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Absolute path of the affected entry.
    pub path: PathBuf,

    /// What happened to it.
    pub event_type: EventType,

    /// Whether the path was a directory.
    pub is_dir: bool,

    /// File length in bytes, if it could be determined.
    pub len: Option<u64>,
}

impl RawEvent {
    /// Creates an event for a regular file of unknown length.
    pub fn new(path: impl Into<PathBuf>, event_type: EventType) -> Self {
        Self {
            path: path.into(),
            event_type,
            is_dir: false,
            len: None,
        }
    }

    /// Creates an event, reading directory flag and length from the file system.
    ///
    /// Paths that no longer exist (e.g. after a delete) keep the defaults.
    pub fn probe(path: impl Into<PathBuf>, event_type: EventType) -> Self {
        let path = path.into();
        match std::fs::symlink_metadata(&path) {
            Ok(meta) => {
                let is_dir = meta.is_dir();
                let len = (!is_dir).then(|| meta.len());
                Self {
                    path,
                    event_type,
                    is_dir,
                    len,
                }
            }
            Err(_) => Self::new(path, event_type),
        }
    }

    /// Marks the event as concerning a directory.
    pub fn directory(mut self) -> Self {
        self.is_dir = true;
        self.len = None;
        self
    }

    /// Records the file length.
    pub fn with_len(mut self, len: u64) -> Self {
        self.len = Some(len);
        self
    }

    /// Returns the path of the event.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A notification entry delivered to a remote watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    /// Absolute path of the file, or the text of a synthetic event.
    pub file_id: String,

    /// What happened.
    pub event_type: EventType,
}

impl FileEvent {
    /// Creates a notification entry.
    pub fn new(file_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            file_id: file_id.into(),
            event_type,
        }
    }

    /// Creates a synthetic system event such as [`TIMED_OUT`] or [`INACTIVE`].
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(text, EventType::System)
    }

    /// Returns `true` if this is a synthetic or platform system event.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.event_type == EventType::System
    }
}

impl From<&RawEvent> for FileEvent {
    fn from(raw: &RawEvent) -> Self {
        Self::new(raw.path.to_string_lossy(), raw.event_type)
    }
}
