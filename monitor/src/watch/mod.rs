//! Platform watch capability.
//!
//! A [`PlatformWatch`] delivers raw `(path, type)` events for one directory
//! (flat or recursive) into a Tokio channel. Monitors only ever see this trait,
//! so the operating system facility behind it is swappable:
//!
//! - [`NotifyBackend`] uses the `notify` crate (inotify, FSEvents,
//!   ReadDirectoryChangesW, or a portable poller)
//! - [`ManualBackend`] is fed by the caller, for embedding and tests
//!
//! A [`WatchBackend`] turns a [`WatchSpec`] into a watch during monitor
//! construction. Set-up validates the root so that an unusable path fails
//! creation instead of surfacing later.

mod manual;
mod notify_backend;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{RawEvent, WatchSpec};

pub use manual::ManualBackend;
pub use notify_backend::{BackendKind, NotifyBackend};

/// Channel end a platform watch delivers event batches into.
pub type RawEventSender = mpsc::Sender<Vec<RawEvent>>;

/// Errors raised by platform watches.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The underlying notify watcher failed.
    #[error("file system watcher failed: {0}")]
    Notify(#[from] notify::Error),

    /// The root of the watch does not exist.
    #[error("watch root does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    /// The root of the watch is not a directory.
    #[error("watch root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Failed to inspect the root.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start` was called on a watch that is already delivering events.
    #[error("watch is already active")]
    AlreadyActive,
}

/// A live subscription to file system activity under one root.
pub trait PlatformWatch: Send + fmt::Debug {
    /// Canonical root directory of the watch.
    fn root(&self) -> &Path;

    /// Begins delivering event batches into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::AlreadyActive`] if the watch is running, or the
    /// backend's error if the subscription cannot be registered.
    fn start(&mut self, sink: RawEventSender) -> Result<(), WatchError>;

    /// Stops delivering events. Stopping an inactive watch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the subscription cannot be removed.
    fn stop(&mut self) -> Result<(), WatchError>;

    /// Returns `true` while events are being delivered.
    fn is_active(&self) -> bool;
}

/// Factory for platform watches.
pub trait WatchBackend: Send + Sync + fmt::Debug {
    /// Short name of the backend, used in logs.
    fn name(&self) -> &'static str;

    /// Prepares a watch for `spec` without starting it.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathNotFound`] or [`WatchError::NotADirectory`]
    /// if the root is unusable.
    fn set_up(&self, spec: &WatchSpec) -> Result<Box<dyn PlatformWatch>, WatchError>;
}

/// Resolves `root` to a canonical directory path.
pub(crate) fn canonical_root(root: &Path) -> Result<PathBuf, WatchError> {
    let canonical = match root.canonicalize() {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WatchError::PathNotFound(root.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    if !canonical.is_dir() {
        return Err(WatchError::NotADirectory(root.to_path_buf()));
    }

    Ok(canonical)
}
