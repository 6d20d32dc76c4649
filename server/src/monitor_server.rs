//! The monitor server: lifecycle of remotely controlled monitors.
//!
//! [`MonitorServer`] is the only component remote watch clients talk to. It
//! builds monitors through a [`MonitorFactory`], keeps them in a
//! [`MonitorRegistry`], and forwards their notifications to the
//! [`RemoteWatcher`] each client registered.
//!
//! # Delivery
//!
//! Every monitor gets its own notifier channel and a delivery task that drains
//! it in order and calls [`MonitorServer::callback`]. A slow or unreachable
//! watcher therefore only delays its own monitor. Failed deliveries are logged
//! and dropped; they never stop the monitor.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use omerofs_monitor::factory::MonitorFactory;
//! use omerofs_monitor::types::WatchSpec;
//! use omerofs_monitor::watch::NotifyBackend;
//! use omerofs_server::monitor_server::MonitorServer;
//! use omerofs_server::remote::ChannelWatcher;
//!
//! # async fn example() -> omerofs_server::error::Result<()> {
//! let server = MonitorServer::new(MonitorFactory::new(NotifyBackend::native()), 16, 64);
//! let (watcher, mut notifications) = ChannelWatcher::new();
//!
//! let id = server.create_monitor("OneShot", WatchSpec::new("/data/incoming"), Arc::new(watcher))?;
//! server.start_monitor(&id)?;
//!
//! if let Some(notification) = notifications.recv().await {
//!     println!("{:?}", notification.events);
//! }
//! server.destroy_monitor(&id)?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use omerofs_monitor::config::Config as EngineConfig;
use omerofs_monitor::error::MonitorError;
use omerofs_monitor::factory::MonitorFactory;
use omerofs_monitor::monitor::Monitor;
use omerofs_monitor::notifier::{Notification, Notifier};
use omerofs_monitor::types::{FileEvent, MonitorId, MonitorState, WatchSpec};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};
use crate::registry::{MonitorEntry, MonitorRegistry};
use crate::remote::RemoteWatcher;
use crate::types::{FileStats, MonitorSummary};

#[derive(Debug)]
struct ServerInner {
    factory: MonitorFactory,
    registry: MonitorRegistry,
    delivery_capacity: usize,
}

/// Registry-backed server for remotely controlled monitors.
///
/// Cheap to clone; clones share one registry.
#[derive(Debug, Clone)]
pub struct MonitorServer {
    inner: Arc<ServerInner>,
}

impl MonitorServer {
    /// Creates a server with an empty registry.
    ///
    /// `delivery_capacity` bounds the notifications queued per monitor while
    /// its watcher is being called; it is clamped to at least 1.
    pub fn new(factory: MonitorFactory, max_monitors: usize, delivery_capacity: usize) -> Self {
        debug!(
            backend = factory.backend().name(),
            max_monitors, delivery_capacity, "Creating monitor server"
        );
        Self {
            inner: Arc::new(ServerInner {
                factory,
                registry: MonitorRegistry::new(max_monitors),
                delivery_capacity: delivery_capacity.max(1),
            }),
        }
    }

    /// Creates a server using the backend and capacities of `config`.
    pub fn from_config(config: &EngineConfig, max_monitors: usize) -> Self {
        Self::new(
            MonitorFactory::from_backend(config.watch_backend()),
            max_monitors,
            config.delivery_capacity,
        )
    }

    /// Builds and registers a monitor, not yet started.
    ///
    /// Must be called from within a Tokio runtime, which hosts the
    /// monitor's delivery task.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AtCapacity`] if the registry is full
    /// - [`ServerError::UnknownMonitorType`] if `tag` names no monitor kind
    /// - [`ServerError::MonitorCreation`] if the spec is invalid, the watch
    ///   cannot be set up, or there is no runtime
    ///
    /// Nothing is registered when an error is returned.
    pub fn create_monitor(
        &self,
        tag: &str,
        spec: WatchSpec,
        proxy: Arc<dyn RemoteWatcher>,
    ) -> Result<MonitorId> {
        self.inner.registry.check_capacity()?;

        let runtime =
            Handle::try_current().map_err(|_| ServerError::MonitorCreation(MonitorError::NoRuntime))?;

        let id = MonitorId::generate();
        let (notifier, rx) = Notifier::channel(id.clone(), self.inner.delivery_capacity);

        let monitor = self
            .inner
            .factory
            .create(tag, id.clone(), spec, notifier)
            .map_err(|e| match e {
                MonitorError::UnknownMonitorType(tag) => ServerError::UnknownMonitorType(tag),
                other => ServerError::MonitorCreation(other),
            })?;

        let kind = monitor.kind();
        let root = monitor.spec().root.clone();
        let target = proxy.target();

        let delivery_task = runtime.spawn(deliver_notifications(Arc::downgrade(&self.inner), rx));
        let entry = MonitorEntry::new(monitor, proxy).with_delivery_task(delivery_task);
        self.inner.registry.insert(id.clone(), entry)?;

        info!(
            monitor_id = %id,
            kind = %kind,
            path = %root.display(),
            target = %target,
            "Monitor created"
        );
        Ok(id)
    }

    /// Starts the monitor registered under `id`.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownMonitorId`] if absent, [`ServerError::MonitorStart`]
    /// if the monitor refuses to start. The entry stays registered either way.
    pub fn start_monitor(&self, id: &MonitorId) -> Result<()> {
        let monitor = self.lookup(id)?;
        monitor.start().map_err(|e| {
            warn!(monitor_id = %id, error = %e, "Failed to start monitor");
            ServerError::MonitorStart(e)
        })?;
        info!(monitor_id = %id, "Monitor started");
        Ok(())
    }

    /// Stops the monitor registered under `id`.
    ///
    /// Stopping a monitor that is not running is a no-op.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownMonitorId`] if absent, [`ServerError::MonitorStop`]
    /// if the watch could not be released. The entry stays registered either way.
    pub fn stop_monitor(&self, id: &MonitorId) -> Result<()> {
        let monitor = self.lookup(id)?;
        monitor.stop().map_err(|e| {
            warn!(monitor_id = %id, error = %e, "Failed to stop monitor");
            ServerError::MonitorStop(e)
        })?;
        info!(monitor_id = %id, state = %monitor.state(), "Monitor stopped");
        Ok(())
    }

    /// Stops (best effort) and unregisters the monitor under `id`.
    ///
    /// Not idempotent: destroying an id that is no longer registered fails.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownMonitorId`] if absent.
    pub fn destroy_monitor(&self, id: &MonitorId) -> Result<()> {
        let entry = self
            .inner
            .registry
            .remove(id)
            .ok_or_else(|| ServerError::UnknownMonitorId(id.clone()))?;

        if let Err(e) = entry.monitor().stop() {
            warn!(monitor_id = %id, error = %e, "Failed to stop monitor during destroy");
        }
        drop(entry);

        info!(monitor_id = %id, "Monitor destroyed");
        Ok(())
    }

    /// Delivers `events` to the remote watcher registered for `id`.
    ///
    /// The watcher is called without holding the registry lock. A delivery
    /// failure is logged and swallowed.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownMonitorId`] if no watcher is registered for `id`.
    pub async fn callback(&self, id: &MonitorId, events: Vec<FileEvent>) -> Result<()> {
        let proxy = self
            .inner
            .registry
            .proxy(id)
            .ok_or_else(|| ServerError::UnknownMonitorId(id.clone()))?;

        match proxy.fs_event_happened(id, &events).await {
            Ok(()) => debug!(monitor_id = %id, count = events.len(), "Notification delivered"),
            Err(e) => warn!(
                monitor_id = %id,
                count = events.len(),
                target = %proxy.target(),
                error = %e,
                "Notification delivery failed, dropping"
            ),
        }
        Ok(())
    }

    /// Returns the lifecycle state of the monitor under `id`.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownMonitorId`] if absent.
    pub fn monitor_state(&self, id: &MonitorId) -> Result<MonitorState> {
        Ok(self.lookup(id)?.state())
    }

    /// Describes the monitor under `id`.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownMonitorId`] if absent.
    pub fn monitor_summary(&self, id: &MonitorId) -> Result<MonitorSummary> {
        self.inner
            .registry
            .summary(id)
            .ok_or_else(|| ServerError::UnknownMonitorId(id.clone()))
    }

    /// Describes every registered monitor, oldest first.
    pub fn list_monitors(&self) -> Vec<MonitorSummary> {
        self.inner.registry.summaries()
    }

    /// Lists a directory under the root of monitor `id`.
    ///
    /// `relative_path` is resolved against the monitor root (empty means the
    /// root itself). Entries are returned as absolute file ids, sorted, and
    /// restricted to names matching `filter` if one is given.
    ///
    /// # Errors
    ///
    /// - [`ServerError::UnknownMonitorId`] if absent
    /// - [`ServerError::InvalidPath`] if the path does not exist, is not a
    ///   directory, or resolves outside the root
    /// - [`ServerError::InvalidFilter`] if `filter` is not a glob pattern
    pub async fn get_directory(
        &self,
        id: &MonitorId,
        relative_path: &str,
        filter: Option<&str>,
    ) -> Result<Vec<String>> {
        let monitor = self.lookup(id)?;
        let pattern = filter
            .map(|f| glob::Pattern::new(f).map_err(|e| ServerError::InvalidFilter(e.to_string())))
            .transpose()?;

        let dir = resolve_under_root(&monitor.spec().root, relative_path).await?;
        if !tokio::fs::metadata(&dir).await?.is_dir() {
            return Err(ServerError::InvalidPath(dir));
        }

        let mut read_dir = tokio::fs::read_dir(&dir).await?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name();
            let matches = pattern
                .as_ref()
                .map_or(true, |p| p.matches(&name.to_string_lossy()));
            if matches {
                entries.push(entry.path().to_string_lossy().into_owned());
            }
        }
        entries.sort();

        debug!(monitor_id = %id, path = %dir.display(), count = entries.len(), "Listed directory");
        Ok(entries)
    }

    /// Returns metadata of a file under the root of monitor `id`.
    ///
    /// `file_id` may be absolute or relative to the root.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownMonitorId`] if absent, [`ServerError::InvalidPath`]
    /// if the file does not exist or resolves outside the root.
    pub async fn get_stats(&self, id: &MonitorId, file_id: &str) -> Result<FileStats> {
        let monitor = self.lookup(id)?;
        let path = resolve_under_root(&monitor.spec().root, file_id).await?;
        let metadata = tokio::fs::metadata(&path).await?;

        let readable = if metadata.is_dir() {
            tokio::fs::read_dir(&path).await.is_ok()
        } else {
            tokio::fs::File::open(&path).await.is_ok()
        };

        Ok(FileStats {
            base_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            accessed: metadata.accessed().ok().map(DateTime::<Utc>::from),
            created: metadata.created().ok().map(DateTime::<Utc>::from),
            is_dir: metadata.is_dir(),
            readable,
            writable: !metadata.permissions().readonly(),
        })
    }

    /// Destroys every registered monitor. Returns how many there were.
    pub fn shutdown(&self) -> usize {
        let entries = self.inner.registry.drain();
        let count = entries.len();

        for entry in entries {
            if let Err(e) = entry.monitor().stop() {
                warn!(
                    monitor_id = %entry.monitor().id(),
                    error = %e,
                    "Failed to stop monitor during shutdown"
                );
            }
        }

        info!(count, "Monitor server shut down");
        count
    }

    /// Returns the number of registered monitors.
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    /// Returns `true` if no monitor is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// Returns the configured maximum number of monitors.
    pub fn max_monitors(&self) -> usize {
        self.inner.registry.max_monitors()
    }

    fn lookup(&self, id: &MonitorId) -> Result<Arc<Monitor>> {
        self.inner
            .registry
            .monitor(id)
            .ok_or_else(|| ServerError::UnknownMonitorId(id.clone()))
    }
}

/// Drains one monitor's notifications in order until the channel closes or
/// the server is dropped.
async fn deliver_notifications(inner: Weak<ServerInner>, mut rx: mpsc::Receiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let server = MonitorServer { inner };
        if let Err(e) = server
            .callback(&notification.monitor_id, notification.events)
            .await
        {
            debug!(error = %e, "Dropping notification for unregistered monitor");
        }
    }
}

/// Resolves `requested` against `root` and checks that the result exists and
/// lies under `root`. Symlinks are followed before the check.
async fn resolve_under_root(root: &Path, requested: &str) -> Result<PathBuf> {
    let candidate = if requested.is_empty() {
        root.to_path_buf()
    } else {
        root.join(requested)
    };

    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ServerError::InvalidPath(candidate));
        }
        Err(e) => return Err(e.into()),
    };

    if !resolved.starts_with(root) {
        return Err(ServerError::InvalidPath(PathBuf::from(requested)));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ChannelWatcher;
    use omerofs_monitor::error::DeliveryError;
    use omerofs_monitor::types::{EventType, RawEvent, INACTIVE, TIMED_OUT};
    use omerofs_monitor::watch::ManualBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    // =========================================================================
    // Test Helpers
    // =========================================================================

    fn server(backend: &ManualBackend) -> MonitorServer {
        MonitorServer::new(MonitorFactory::new(backend.clone()), 16, 16)
    }

    fn watcher() -> (Arc<dyn RemoteWatcher>, mpsc::UnboundedReceiver<Notification>) {
        let (watcher, rx) = ChannelWatcher::new();
        (Arc::new(watcher), rx)
    }

    fn create(root: &str, name: &str) -> RawEvent {
        RawEvent::new(Path::new(root).join(name), EventType::Create).with_len(1)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("notification expected")
            .expect("channel open")
    }

    /// A watcher that always fails, counting attempts.
    #[derive(Debug, Default)]
    struct FailingWatcher {
        attempts: AtomicUsize,
    }

    impl RemoteWatcher for FailingWatcher {
        fn fs_event_happened<'a>(
            &'a self,
            _monitor_id: &'a MonitorId,
            _events: &'a [FileEvent],
        ) -> futures_util::future::BoxFuture<'a, std::result::Result<(), DeliveryError>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(DeliveryError::Unreachable("connection refused".into())) })
        }

        fn target(&self) -> String {
            "nowhere".to_string()
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[tokio::test]
    async fn create_registers_without_starting() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let (proxy, _rx) = watcher();

        let id = server
            .create_monitor("Persistent", WatchSpec::new("/data/m1"), proxy)
            .unwrap();

        assert_eq!(server.len(), 1);
        assert_eq!(server.monitor_state(&id).unwrap(), MonitorState::Created);
        assert_eq!(backend.active_watches("/data/m1"), 0);
    }

    #[tokio::test]
    async fn persistent_monitor_delivers_filtered_batch() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let (proxy, mut rx) = watcher();
        let spec = WatchSpec::new("/data/m1")
            .with_event_types([EventType::Create])
            .with_whitelist([".jpg"])
            .with_block_size(3)
            .with_timeout(Duration::from_millis(100));

        let id = server.create_monitor("Persistent", spec, proxy).unwrap();
        server.start_monitor(&id).unwrap();
        backend.emit(
            "/data/m1",
            vec![
                create("/data/m1", "a.jpg"),
                create("/data/m1", "b.txt"),
                create("/data/m1", "c.jpg"),
            ],
        );

        let notification = next(&mut rx).await;
        assert_eq!(notification.monitor_id, id);
        assert_eq!(
            notification.events,
            vec![
                FileEvent::new("/data/m1/a.jpg", EventType::Create),
                FileEvent::new("/data/m1/c.jpg", EventType::Create),
            ]
        );
    }

    #[tokio::test]
    async fn one_shot_timeout_reaches_watcher_and_stop_is_noop() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let (proxy, mut rx) = watcher();
        let spec = WatchSpec::new("/data/m2").with_timeout(Duration::from_millis(50));

        let id = server.create_monitor("OneShot", spec, proxy).unwrap();
        server.start_monitor(&id).unwrap();

        let notification = next(&mut rx).await;
        assert_eq!(notification.events, vec![FileEvent::system(TIMED_OUT)]);
        assert_eq!(server.monitor_state(&id).unwrap(), MonitorState::TimedOut);

        assert_ok!(server.stop_monitor(&id));
        assert_eq!(server.monitor_state(&id).unwrap(), MonitorState::TimedOut);
        assert_eq!(server.len(), 1);
    }

    #[tokio::test]
    async fn inactivity_monitor_reports_inactive() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let (proxy, mut rx) = watcher();
        let spec = WatchSpec::new("/data/m3").with_timeout(Duration::from_millis(80));

        let id = server.create_monitor("Inactivity", spec, proxy).unwrap();
        server.start_monitor(&id).unwrap();
        backend.emit("/data/m3", vec![create("/data/m3", "a.dat")]);

        assert_eq!(next(&mut rx).await.events.len(), 1);
        assert_eq!(next(&mut rx).await.events, vec![FileEvent::system(INACTIVE)]);
        assert_eq!(server.monitor_state(&id).unwrap(), MonitorState::Inactive);
    }

    #[tokio::test]
    async fn start_twice_is_a_start_error() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let (proxy, _rx) = watcher();

        let id = server
            .create_monitor("Persistent", WatchSpec::new("/data/m1"), proxy)
            .unwrap();
        server.start_monitor(&id).unwrap();

        assert!(matches!(
            server.start_monitor(&id),
            Err(ServerError::MonitorStart(MonitorError::AlreadyRunning))
        ));
        assert_eq!(server.len(), 1);
    }

    #[tokio::test]
    async fn destroy_releases_watch_and_is_not_idempotent() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let (proxy, _rx) = watcher();

        let id = server
            .create_monitor("Persistent", WatchSpec::new("/data/m1"), proxy)
            .unwrap();
        server.start_monitor(&id).unwrap();
        assert_eq!(backend.active_watches("/data/m1"), 1);

        assert_ok!(server.destroy_monitor(&id));
        assert!(server.is_empty());
        assert_eq!(backend.active_watches("/data/m1"), 0);

        assert!(matches!(
            server.destroy_monitor(&id),
            Err(ServerError::UnknownMonitorId(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_destroys_everything() {
        let backend = ManualBackend::new();
        let server = server(&backend);

        for root in ["/data/a", "/data/b"] {
            let (proxy, _rx) = watcher();
            let id = server
                .create_monitor("Persistent", WatchSpec::new(root), proxy)
                .unwrap();
            server.start_monitor(&id).unwrap();
        }

        assert_eq!(server.shutdown(), 2);
        assert!(server.is_empty());
        assert_eq!(backend.active_watches("/data/a"), 0);
        assert_eq!(backend.active_watches("/data/b"), 0);
    }

    // =========================================================================
    // Failures and Isolation
    // =========================================================================

    #[tokio::test]
    async fn unknown_id_fails_and_leaves_registry_unchanged() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let (proxy, _rx) = watcher();
        server
            .create_monitor("Persistent", WatchSpec::new("/data/m1"), proxy)
            .unwrap();

        let missing = MonitorId::from("nonexistent-id");
        assert!(matches!(
            server.start_monitor(&missing),
            Err(ServerError::UnknownMonitorId(_))
        ));
        assert!(matches!(
            server.stop_monitor(&missing),
            Err(ServerError::UnknownMonitorId(_))
        ));
        assert!(matches!(
            server.destroy_monitor(&missing),
            Err(ServerError::UnknownMonitorId(_))
        ));
        assert!(matches!(
            server.callback(&missing, vec![]).await,
            Err(ServerError::UnknownMonitorId(_))
        ));
        assert_eq!(server.len(), 1);
    }

    #[tokio::test]
    async fn stopping_one_monitor_leaves_others_running() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let (proxy_a, _rx_a) = watcher();
        let (proxy_b, mut rx_b) = watcher();

        let a = server
            .create_monitor("Persistent", WatchSpec::new("/data/a"), proxy_a)
            .unwrap();
        let b = server
            .create_monitor(
                "Persistent",
                WatchSpec::new("/data/b").with_block_size(1),
                proxy_b,
            )
            .unwrap();
        server.start_monitor(&a).unwrap();
        server.start_monitor(&b).unwrap();

        server.stop_monitor(&a).unwrap();
        server.destroy_monitor(&a).unwrap();

        assert_eq!(server.monitor_state(&b).unwrap(), MonitorState::Running);
        backend.emit("/data/b", vec![create("/data/b", "still.dat")]);
        assert_eq!(next(&mut rx_b).await.monitor_id, b);
    }

    #[tokio::test]
    async fn unknown_tag_registers_nothing() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let (proxy, _rx) = watcher();

        let result = server.create_monitor("Sometimes", WatchSpec::new("/data/m1"), proxy);
        assert!(matches!(result, Err(ServerError::UnknownMonitorType(_))));
        assert!(server.is_empty());
    }

    #[tokio::test]
    async fn watch_setup_failure_registers_nothing() {
        let backend = ManualBackend::new();
        backend.reject_path("/gone");
        let server = server(&backend);
        let (proxy, _rx) = watcher();

        let result = server.create_monitor("Persistent", WatchSpec::new("/gone"), proxy);
        assert!(matches!(result, Err(ServerError::MonitorCreation(_))));
        assert!(server.is_empty());
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let backend = ManualBackend::new();
        let server = MonitorServer::new(MonitorFactory::new(backend), 1, 4);
        let (proxy, _rx) = watcher();
        server
            .create_monitor("Persistent", WatchSpec::new("/data/a"), Arc::clone(&proxy))
            .unwrap();

        let result = server.create_monitor("Persistent", WatchSpec::new("/data/b"), proxy);
        assert!(matches!(result, Err(ServerError::AtCapacity { max: 1 })));
        assert_eq!(server.len(), 1);
    }

    #[test]
    fn create_outside_runtime_fails() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let (proxy, _rx) = watcher();

        let result = server.create_monitor("Persistent", WatchSpec::new("/data/a"), proxy);
        assert!(matches!(
            result,
            Err(ServerError::MonitorCreation(MonitorError::NoRuntime))
        ));
        assert!(server.is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_monitor() {
        let backend = ManualBackend::new();
        let server = server(&backend);
        let failing = Arc::new(FailingWatcher::default());
        let spec = WatchSpec::new("/data/m1").with_block_size(1);

        let id = server
            .create_monitor("Persistent", spec, Arc::clone(&failing) as Arc<dyn RemoteWatcher>)
            .unwrap();
        server.start_monitor(&id).unwrap();

        backend.emit("/data/m1", vec![create("/data/m1", "a.dat")]);
        backend.emit("/data/m1", vec![create("/data/m1", "b.dat")]);

        timeout(Duration::from_secs(2), async {
            while failing.attempts.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both deliveries attempted");

        assert_eq!(server.monitor_state(&id).unwrap(), MonitorState::Running);
        assert_ok!(server.callback(&id, vec![]).await);
    }

    // =========================================================================
    // Directory and Stats
    // =========================================================================

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("a.jpg"), b"jpeg").unwrap();
        std::fs::write(root.join("b.txt"), b"text").unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("sub").join("c.jpg"), b"jpeg!").unwrap();
        (dir, root)
    }

    fn monitor_on(server: &MonitorServer, root: &Path) -> MonitorId {
        let (proxy, _rx) = watcher();
        server
            .create_monitor("Persistent", WatchSpec::new(root), proxy)
            .unwrap()
    }

    #[tokio::test]
    async fn get_directory_lists_and_filters() {
        let (_dir, root) = fixture();
        let server = server(&ManualBackend::new());
        let id = monitor_on(&server, &root);

        let all = server.get_directory(&id, "", None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&root.join("a.jpg").to_string_lossy().into_owned()));

        let jpgs = server.get_directory(&id, "", Some("*.jpg")).await.unwrap();
        assert_eq!(jpgs, vec![root.join("a.jpg").to_string_lossy().into_owned()]);

        let nested = server.get_directory(&id, "sub", None).await.unwrap();
        assert_eq!(
            nested,
            vec![root.join("sub").join("c.jpg").to_string_lossy().into_owned()]
        );
    }

    #[tokio::test]
    async fn get_directory_rejects_escapes_and_bad_filters() {
        let (_dir, root) = fixture();
        let server = server(&ManualBackend::new());
        let id = monitor_on(&server, &root);

        assert!(matches!(
            server.get_directory(&id, "..", None).await,
            Err(ServerError::InvalidPath(_))
        ));
        assert!(matches!(
            server.get_directory(&id, "missing", None).await,
            Err(ServerError::InvalidPath(_))
        ));
        assert!(matches!(
            server.get_directory(&id, "a.jpg", None).await,
            Err(ServerError::InvalidPath(_))
        ));
        assert!(matches!(
            server.get_directory(&id, "", Some("[")).await,
            Err(ServerError::InvalidFilter(_))
        ));
    }

    #[tokio::test]
    async fn get_stats_reports_metadata() {
        let (_dir, root) = fixture();
        let server = server(&ManualBackend::new());
        let id = monitor_on(&server, &root);

        let stats = server.get_stats(&id, "sub/c.jpg").await.unwrap();
        assert_eq!(stats.base_name, "c.jpg");
        assert_eq!(stats.size, 5);
        assert!(!stats.is_dir);
        assert!(stats.readable);
        assert!(stats.modified.is_some());

        let absolute = root.join("a.jpg");
        let stats = server
            .get_stats(&id, &absolute.to_string_lossy())
            .await
            .unwrap();
        assert_eq!(stats.base_name, "a.jpg");

        assert!(server.get_stats(&id, "sub").await.unwrap().is_dir);
        assert!(matches!(
            server.get_stats(&id, "/etc/hostname").await,
            Err(ServerError::InvalidPath(_))
        ));
    }
}
