//! Platform watches backed by the [`notify`] crate.
//!
//! The notify callback runs on a watcher thread. It is kept light: it
//! translates the event, records the path metadata, and hands the batch to the
//! monitor's channel with `try_send`. A full channel drops the batch with a
//! warning instead of blocking the watcher thread.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{
    Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode,
    Watcher,
};
use tracing::{debug, error, trace, warn};

use super::{canonical_root, PlatformWatch, RawEventSender, WatchBackend, WatchError};
use crate::types::{EventType, RawEvent, WatchSpec};

/// Default interval between scans of the polling backend.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Which notify watcher implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// The operating system's native facility.
    #[default]
    Native,
    /// Periodic directory scans; works everywhere, including network mounts.
    Poll,
}

impl BackendKind {
    /// Returns the lowercase name of the backend kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "poll" => Ok(Self::Poll),
            other => Err(format!("unknown backend '{other}', expected 'native' or 'poll'")),
        }
    }
}

/// Watch backend built on notify.
#[derive(Debug, Clone)]
pub struct NotifyBackend {
    kind: BackendKind,
    poll_interval: Duration,
}

impl NotifyBackend {
    /// Creates a backend of the given kind.
    ///
    /// `poll_interval` is only used by [`BackendKind::Poll`].
    #[must_use]
    pub fn new(kind: BackendKind, poll_interval: Duration) -> Self {
        Self {
            kind,
            poll_interval,
        }
    }

    /// Creates a backend using the native facility.
    #[must_use]
    pub fn native() -> Self {
        Self::new(BackendKind::Native, DEFAULT_POLL_INTERVAL)
    }

    /// Creates a polling backend.
    #[must_use]
    pub fn poll(interval: Duration) -> Self {
        Self::new(BackendKind::Poll, interval)
    }

    /// Returns the backend kind.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.kind
    }
}

impl Default for NotifyBackend {
    fn default() -> Self {
        Self::native()
    }
}

impl WatchBackend for NotifyBackend {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    fn set_up(&self, spec: &WatchSpec) -> Result<Box<dyn PlatformWatch>, WatchError> {
        let root = canonical_root(&spec.root)?;
        let mode = if spec.path_mode.is_recursive() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        debug!(root = %root.display(), backend = %self.kind, ?mode, "Prepared notify watch");

        Ok(Box::new(NotifyWatch {
            kind: self.kind,
            poll_interval: self.poll_interval,
            root,
            mode,
            watcher: None,
        }))
    }
}

/// A notify watcher over one root.
pub struct NotifyWatch {
    kind: BackendKind,
    poll_interval: Duration,
    root: PathBuf,
    mode: RecursiveMode,

    /// Present while active; dropping it ends the subscription.
    watcher: Option<Box<dyn Watcher + Send>>,
}

impl fmt::Debug for NotifyWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyWatch")
            .field("kind", &self.kind)
            .field("root", &self.root)
            .field("mode", &self.mode)
            .field("active", &self.watcher.is_some())
            .finish()
    }
}

impl PlatformWatch for NotifyWatch {
    fn root(&self) -> &Path {
        &self.root
    }

    fn start(&mut self, sink: RawEventSender) -> Result<(), WatchError> {
        if self.watcher.is_some() {
            return Err(WatchError::AlreadyActive);
        }

        let handler = move |res: notify::Result<Event>| handle_notify_event(res, &sink);

        let mut watcher: Box<dyn Watcher + Send> = match self.kind {
            BackendKind::Native => Box::new(RecommendedWatcher::new(handler, NotifyConfig::default())?),
            BackendKind::Poll => Box::new(PollWatcher::new(
                handler,
                NotifyConfig::default().with_poll_interval(self.poll_interval),
            )?),
        };
        watcher.watch(&self.root, self.mode)?;

        debug!(root = %self.root.display(), backend = %self.kind, "Started notify watch");
        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), WatchError> {
        if let Some(mut watcher) = self.watcher.take() {
            // The root may already be gone, which removes the OS watch with it.
            if let Err(e) = watcher.unwatch(&self.root) {
                debug!(root = %self.root.display(), error = %e, "Unwatch failed, dropping watcher");
            }
            debug!(root = %self.root.display(), "Stopped notify watch");
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.watcher.is_some()
    }
}

/// Handles one callback from a notify watcher.
fn handle_notify_event(res: notify::Result<Event>, sink: &RawEventSender) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    let batch = translate(&event);
    if batch.is_empty() {
        return;
    }

    if let Err(e) = sink.try_send(batch) {
        warn!(error = %e, "Failed to queue raw events, channel may be full or closed");
    }
}

/// Maps a notify event to raw events, probing each path's metadata.
fn translate(event: &Event) -> Vec<RawEvent> {
    if event.need_rescan() {
        return event
            .paths
            .iter()
            .map(|path| RawEvent::new(path.clone(), EventType::System))
            .collect();
    }

    // A removed path can no longer be probed, so trust the kind when notify has one.
    let folder = matches!(
        event.kind,
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
    );

    let typed = |event_type: EventType| -> Vec<RawEvent> {
        event
            .paths
            .iter()
            .map(|path| {
                let raw = RawEvent::probe(path.clone(), event_type);
                if folder {
                    raw.directory()
                } else {
                    raw
                }
            })
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => typed(EventType::Create),
        EventKind::Remove(_) => typed(EventType::Delete),
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
            typed(EventType::Modify)
        }
        // The polling backend reports content changes as write time changes.
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)) => typed(EventType::Modify),
        EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => typed(EventType::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => typed(EventType::Create),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut events = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                events.push(RawEvent::new(from.clone(), EventType::Delete));
            }
            if let Some(to) = event.paths.get(1) {
                events.push(RawEvent::probe(to.clone(), EventType::Create));
            }
            events
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                if path.exists() {
                    RawEvent::probe(path.clone(), EventType::Create)
                } else {
                    RawEvent::new(path.clone(), EventType::Delete)
                }
            })
            .collect(),
        EventKind::Any | EventKind::Other => typed(EventType::System),
    }
}
