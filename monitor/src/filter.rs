//! Path filtering for raw file system events.
//!
//! [`PathFilter`] decides, for each [`RawEvent`], whether it is reported to
//! the watcher. It is built once from a [`WatchSpec`] and is a pure function of
//! the event afterwards: the platform watch records directory flag and length
//! on the event, so no rule touches the disk.
//!
//! Rules, in order:
//!
//! 1. the event type must be one of the spec's event types
//! 2. in flat mode the path must be a direct child of the root, except for
//!    system events, which may name the root itself
//! 3. directory events are dropped when `ignore_dir_events` is set
//! 4. operating system junk is dropped when `ignore_sys_files` is set
//! 5. a non-empty whitelist keeps only matching extensions or file names;
//!    system events are not subject to it
//! 6. paths below a blacklisted subdirectory are dropped
//! 7. creates and modifies of zero-length files are dropped
//!
//! Rule 7 is advisory: a file that later grows produces a new modify event
//! and is evaluated again from scratch.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use tracing::trace;

use crate::types::{EventType, PathMode, RawEvent, WatchSpec};

/// File names created by operating systems and desktop tools.
const SYSTEM_FILE_NAMES: &[&str] = &[
    ".ds_store",
    "thumbs.db",
    "ehthumbs.db",
    "desktop.ini",
    ".localized",
    ".spotlight-v100",
    ".trashes",
    ".fseventsd",
    ".temporaryitems",
    "$recycle.bin",
];

/// Prefixes of transient or metadata files (AppleDouble, Office and LibreOffice locks).
const SYSTEM_FILE_PREFIXES: &[&str] = &["._", "~$", ".~lock."];

/// Placeholder folder names that are renamed right after creation.
const PLACEHOLDER_FOLDERS: &[&str] = &["new folder", "untitled folder"];

/// Returns `true` if a single path component names operating system junk.
///
/// # Example
///
/// ```
/// use omerofs_monitor::filter::is_system_name;
///
/// assert!(is_system_name(".DS_Store"));
/// assert!(is_system_name("._photo.jpg"));
/// assert!(is_system_name("New Folder (2)"));
/// assert!(!is_system_name("photo.jpg"));
/// ```
#[must_use]
pub fn is_system_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    SYSTEM_FILE_NAMES.contains(&lower.as_str())
        || SYSTEM_FILE_PREFIXES.iter().any(|p| lower.starts_with(p))
        || PLACEHOLDER_FOLDERS.iter().any(|p| lower.contains(p))
}

/// Event filter derived from a [`WatchSpec`].
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    path_mode: PathMode,
    event_types: HashSet<EventType>,
    whitelist: HashSet<String>,
    blacklist: HashSet<String>,
    ignore_sys_files: bool,
    ignore_dir_events: bool,
}

impl PathFilter {
    /// Builds the filter for a watch.
    ///
    /// Whitelist entries are matched case-insensitively against the file
    /// extension (with or without the leading dot) and the full file name.
    #[must_use]
    pub fn new(spec: &WatchSpec) -> Self {
        let whitelist = spec
            .whitelist
            .iter()
            .map(|entry| entry.trim().trim_start_matches('.').to_lowercase())
            .filter(|entry| !entry.is_empty())
            .collect();

        let blacklist = spec
            .blacklist
            .iter()
            .map(|entry| entry.trim().trim_matches('/').to_string())
            .filter(|entry| !entry.is_empty())
            .collect();

        Self {
            root: spec.root.clone(),
            path_mode: spec.path_mode,
            event_types: spec.event_types.clone(),
            whitelist,
            blacklist,
            ignore_sys_files: spec.ignore_sys_files,
            ignore_dir_events: spec.ignore_dir_events,
        }
    }

    /// Returns `true` if the event should be reported.
    #[must_use]
    pub fn includes(&self, event: &RawEvent) -> bool {
        if !self.event_types.contains(&event.event_type) {
            trace!(path = %event.path.display(), kind = %event.event_type, "Event type not of interest");
            return false;
        }

        let system = event.event_type == EventType::System;

        if self.path_mode == PathMode::Flat
            && !system
            && event.path.parent() != Some(self.root.as_path())
        {
            trace!(path = %event.path.display(), "Outside flat watch");
            return false;
        }

        if self.ignore_dir_events && event.is_dir {
            trace!(path = %event.path.display(), "Directory event ignored");
            return false;
        }

        let relative = self.relative(&event.path);

        if self.ignore_sys_files && names(relative).any(is_system_name) {
            trace!(path = %event.path.display(), "System file ignored");
            return false;
        }

        if !system && !self.whitelist.is_empty() && !self.is_whitelisted(&event.path) {
            trace!(path = %event.path.display(), "Not whitelisted");
            return false;
        }

        if !self.blacklist.is_empty() && self.is_blacklisted(relative) {
            trace!(path = %event.path.display(), "Below blacklisted directory");
            return false;
        }

        if matches!(event.event_type, EventType::Create | EventType::Modify)
            && !event.is_dir
            && event.len == Some(0)
        {
            trace!(path = %event.path.display(), "Zero-length file skipped");
            return false;
        }

        true
    }

    /// Keeps only the events that pass the filter, preserving their order.
    #[must_use]
    pub fn apply(&self, mut events: Vec<RawEvent>) -> Vec<RawEvent> {
        events.retain(|event| self.includes(event));
        events
    }

    /// Returns the path below the root, or the whole path if it lies elsewhere.
    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    fn is_whitelisted(&self, path: &Path) -> bool {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase());

        extension.is_some_and(|ext| self.whitelist.contains(&ext))
            || file_name.is_some_and(|name| self.whitelist.contains(&name))
    }

    fn is_blacklisted(&self, relative: &Path) -> bool {
        // The last component is the entry itself; only its ancestors count.
        let parent = relative.parent().unwrap_or(Path::new(""));
        names(parent).any(|name| self.blacklist.contains(name))
    }
}

/// Iterates over the normal (named) components of a path.
fn names(path: &Path) -> impl Iterator<Item = &str> {
    path.components().filter_map(|component| match component {
        Component::Normal(name) => name.to_str(),
        _ => None,
    })
}
