//! In-memory watch backend fed by the caller.
//!
//! [`ManualBackend`] never touches the file system: roots are taken as given and
//! events only arrive when the caller injects them with [`ManualBackend::emit`].
//! This makes monitor behavior deterministic for embedding and tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, trace, warn};

use super::{PlatformWatch, RawEventSender, WatchBackend, WatchError};
use crate::types::{RawEvent, WatchSpec};

type Slot = Arc<Mutex<Option<RawEventSender>>>;

#[derive(Debug, Default)]
struct ManualState {
    watches: Vec<(PathBuf, Weak<Mutex<Option<RawEventSender>>>)>,
    rejected: HashSet<PathBuf>,
}

/// Watch backend whose events are injected by the caller.
///
/// Clones share the same set of watches.
///
/// # Example
///
/// ```
/// use omerofs_monitor::types::{EventType, RawEvent, WatchSpec};
/// use omerofs_monitor::watch::{ManualBackend, WatchBackend};
///
/// let backend = ManualBackend::new();
/// let watch = backend.set_up(&WatchSpec::new("/data")).unwrap();
///
/// // Not started yet, so nobody receives the event.
/// let delivered = backend.emit("/data", vec![RawEvent::new("/data/a", EventType::Create)]);
/// assert_eq!(delivered, 0);
/// # drop(watch);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualBackend {
    state: Arc<Mutex<ManualState>>,
}

impl ManualBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `set_up` fail with [`WatchError::PathNotFound`] for `root`.
    pub fn reject_path(&self, root: impl Into<PathBuf>) {
        self.lock().rejected.insert(root.into());
    }

    /// Delivers `events` to every active watch on `root`.
    ///
    /// Returns the number of watches that accepted the batch.
    pub fn emit(&self, root: impl AsRef<Path>, events: Vec<RawEvent>) -> usize {
        let root = root.as_ref();
        let sinks: Vec<RawEventSender> = {
            let mut state = self.lock();
            state.watches.retain(|(_, slot)| slot.strong_count() > 0);
            state
                .watches
                .iter()
                .filter(|(watched, _)| watched == root)
                .filter_map(|(_, slot)| {
                    let slot = slot.upgrade()?;
                    let sink = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
                    sink
                })
                .collect()
        };

        let mut delivered = 0;
        for sink in sinks {
            match sink.try_send(events.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(root = %root.display(), error = %e, "Failed to inject events"),
            }
        }

        trace!(root = %root.display(), count = events.len(), delivered, "Injected events");
        delivered
    }

    /// Returns the number of started watches on `root`.
    #[must_use]
    pub fn active_watches(&self, root: impl AsRef<Path>) -> usize {
        let root = root.as_ref();
        self.lock()
            .watches
            .iter()
            .filter(|(watched, _)| watched == root)
            .filter_map(|(_, slot)| slot.upgrade())
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WatchBackend for ManualBackend {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn set_up(&self, spec: &WatchSpec) -> Result<Box<dyn PlatformWatch>, WatchError> {
        let mut state = self.lock();
        if state.rejected.contains(&spec.root) {
            return Err(WatchError::PathNotFound(spec.root.clone()));
        }

        let slot: Slot = Arc::new(Mutex::new(None));
        state
            .watches
            .push((spec.root.clone(), Arc::downgrade(&slot)));

        debug!(root = %spec.root.display(), "Prepared manual watch");
        Ok(Box::new(ManualWatch {
            root: spec.root.clone(),
            slot,
        }))
    }
}

/// A watch registered with a [`ManualBackend`].
#[derive(Debug)]
struct ManualWatch {
    root: PathBuf,
    slot: Slot,
}

impl PlatformWatch for ManualWatch {
    fn root(&self) -> &Path {
        &self.root
    }

    fn start(&mut self, sink: RawEventSender) -> Result<(), WatchError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(WatchError::AlreadyActive);
        }
        *slot = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), WatchError> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
