//! Construction of monitors from a type tag.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{MonitorError, Result};
use crate::monitor::Monitor;
use crate::notifier::Notifier;
use crate::types::{MonitorId, MonitorKind, WatchSpec};
use crate::watch::WatchBackend;

/// Builds monitors on top of a watch backend.
///
/// # Example
///
/// ```
/// use omerofs_monitor::factory::MonitorFactory;
/// use omerofs_monitor::notifier::Notifier;
/// use omerofs_monitor::types::{MonitorId, MonitorState, WatchSpec};
/// use omerofs_monitor::watch::ManualBackend;
///
/// let factory = MonitorFactory::new(ManualBackend::new());
/// let id = MonitorId::generate();
/// let (notifier, _rx) = Notifier::channel(id.clone(), 16);
///
/// let monitor = factory
///     .create("OneShot", id, WatchSpec::new("/data"), notifier)
///     .unwrap();
/// assert_eq!(monitor.state(), MonitorState::Created);
/// ```
#[derive(Debug, Clone)]
pub struct MonitorFactory {
    backend: Arc<dyn WatchBackend>,
}

impl MonitorFactory {
    /// Creates a factory using `backend` for every monitor.
    pub fn new(backend: impl WatchBackend + 'static) -> Self {
        Self::from_backend(Arc::new(backend))
    }

    /// Creates a factory from a shared backend.
    #[must_use]
    pub fn from_backend(backend: Arc<dyn WatchBackend>) -> Self {
        Self { backend }
    }

    /// Returns the backend the factory builds watches with.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn WatchBackend> {
        &self.backend
    }

    /// Builds a monitor of the kind named by `tag`, not yet started.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::UnknownMonitorType`] for an unrecognised tag,
    /// and the errors of [`build`](Self::build) otherwise.
    pub fn create(
        &self,
        tag: &str,
        id: MonitorId,
        spec: WatchSpec,
        notifier: Notifier,
    ) -> Result<Monitor> {
        let kind: MonitorKind = tag.parse()?;
        self.build(kind, id, spec, notifier)
    }

    /// Builds a monitor of the given kind, not yet started.
    ///
    /// The platform watch is set up here, so an unusable root fails now
    /// rather than at start. The monitor's spec carries the canonical root.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::InvalidSpec`] if the block size is zero, or the
    ///   timeout of a one-shot or inactivity monitor is zero
    /// - [`MonitorError::Watch`] if the platform watch cannot be set up
    pub fn build(
        &self,
        kind: MonitorKind,
        id: MonitorId,
        spec: WatchSpec,
        notifier: Notifier,
    ) -> Result<Monitor> {
        validate(kind, &spec)?;

        let watch = self.backend.set_up(&spec)?;
        let spec = spec.with_root(watch.root());

        debug!(
            monitor_id = %id,
            kind = %kind,
            backend = self.backend.name(),
            root = %spec.root.display(),
            "Built monitor"
        );

        Ok(Monitor::new(id, kind, spec, watch, notifier))
    }
}

fn validate(kind: MonitorKind, spec: &WatchSpec) -> Result<()> {
    if spec.block_size == 0 {
        return Err(MonitorError::InvalidSpec(
            "block size must be greater than 0".to_string(),
        ));
    }

    if kind != MonitorKind::Persistent && spec.timeout == Duration::ZERO {
        return Err(MonitorError::InvalidSpec(format!(
            "{kind} monitors need a non-zero timeout"
        )));
    }

    Ok(())
}
