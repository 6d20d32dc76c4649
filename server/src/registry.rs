//! Registry of live monitors.
//!
//! [`MonitorRegistry`] maps each [`MonitorId`] to the [`MonitorEntry`] that
//! owns the monitor, the remote watcher its notifications go to, and the task
//! delivering them. It is an owned value injected into a
//! [`MonitorServer`](crate::monitor_server::MonitorServer), so independent
//! servers never share state.
//!
//! # Thread Safety
//!
//! The map sits behind one [`RwLock`]. Callers copy out the `Arc`s they need
//! and release the lock before stopping a monitor or calling a remote
//! watcher; no lock is held across I/O.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use omerofs_monitor::monitor::Monitor;
use omerofs_monitor::types::MonitorId;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::error::{Result, ServerError};
use crate::remote::RemoteWatcher;
use crate::types::MonitorSummary;

/// Everything the server keeps for one monitor.
///
/// Dropping an entry aborts its delivery task; dropping the last handle to
/// the monitor stops its watch.
#[derive(Debug)]
pub struct MonitorEntry {
    monitor: Arc<Monitor>,
    proxy: Arc<dyn RemoteWatcher>,
    delivery_task: Option<JoinHandle<()>>,
    created_at: DateTime<Utc>,
}

impl MonitorEntry {
    /// Creates an entry with no delivery task attached.
    pub fn new(monitor: Monitor, proxy: Arc<dyn RemoteWatcher>) -> Self {
        Self {
            monitor: Arc::new(monitor),
            proxy,
            delivery_task: None,
            created_at: Utc::now(),
        }
    }

    /// Attaches the task draining this monitor's notifications.
    #[must_use]
    pub fn with_delivery_task(mut self, task: JoinHandle<()>) -> Self {
        self.delivery_task = Some(task);
        self
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn proxy(&self) -> &Arc<dyn RemoteWatcher> {
        &self.proxy
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Describes the entry for listings.
    pub fn summary(&self) -> MonitorSummary {
        MonitorSummary {
            monitor_id: self.monitor.id().clone(),
            kind: self.monitor.kind(),
            state: self.monitor.state(),
            path: self.monitor.spec().root.clone(),
            target: self.proxy.target(),
            created_at: self.created_at,
        }
    }
}

impl Drop for MonitorEntry {
    fn drop(&mut self) {
        if let Some(task) = self.delivery_task.take() {
            task.abort();
        }
    }
}

/// Thread-safe map of registered monitors with a capacity limit.
#[derive(Debug)]
pub struct MonitorRegistry {
    entries: RwLock<HashMap<MonitorId, MonitorEntry>>,
    max_monitors: usize,
}

impl MonitorRegistry {
    /// Creates an empty registry holding at most `max_monitors` entries.
    pub fn new(max_monitors: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_monitors,
        }
    }

    /// Returns the configured capacity.
    pub fn max_monitors(&self) -> usize {
        self.max_monitors
    }

    /// Fails with [`ServerError::AtCapacity`] if no entry can be added.
    ///
    /// Advisory only: [`insert`](Self::insert) repeats the check under the
    /// write lock.
    pub fn check_capacity(&self) -> Result<()> {
        if self.read().len() >= self.max_monitors {
            return Err(ServerError::AtCapacity {
                max: self.max_monitors,
            });
        }
        Ok(())
    }

    /// Registers `entry` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AtCapacity`] if the registry is full; the entry
    /// is dropped, which releases its monitor.
    pub fn insert(&self, id: MonitorId, entry: MonitorEntry) -> Result<()> {
        let mut entries = self.write();

        if entries.len() >= self.max_monitors {
            warn!(
                count = entries.len(),
                max_monitors = self.max_monitors,
                "Monitor registry at capacity, rejecting new monitor"
            );
            return Err(ServerError::AtCapacity {
                max: self.max_monitors,
            });
        }

        trace!(monitor_id = %id, "Registering monitor");
        entries.insert(id, entry);
        Ok(())
    }

    /// Removes and returns the entry for `id`.
    pub fn remove(&self, id: &MonitorId) -> Option<MonitorEntry> {
        self.write().remove(id)
    }

    /// Removes and returns every entry.
    pub fn drain(&self) -> Vec<MonitorEntry> {
        self.write().drain().map(|(_, entry)| entry).collect()
    }

    /// Returns the monitor registered under `id`.
    pub fn monitor(&self, id: &MonitorId) -> Option<Arc<Monitor>> {
        self.read().get(id).map(|entry| Arc::clone(&entry.monitor))
    }

    /// Returns the remote watcher registered under `id`.
    pub fn proxy(&self, id: &MonitorId) -> Option<Arc<dyn RemoteWatcher>> {
        self.read().get(id).map(|entry| Arc::clone(&entry.proxy))
    }

    /// Describes the entry registered under `id`.
    pub fn summary(&self, id: &MonitorId) -> Option<MonitorSummary> {
        self.read().get(id).map(MonitorEntry::summary)
    }

    /// Describes every entry, ordered by creation time.
    pub fn summaries(&self) -> Vec<MonitorSummary> {
        let mut summaries: Vec<_> = self.read().values().map(MonitorEntry::summary).collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.monitor_id.cmp(&b.monitor_id))
        });
        summaries
    }

    pub fn contains(&self, id: &MonitorId) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<MonitorId, MonitorEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<MonitorId, MonitorEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
