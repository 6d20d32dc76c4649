//! Monitors: one watched directory, one delivery policy.
//!
//! A [`Monitor`] owns a platform watch, a [`PathFilter`], and one of three
//! delivery policies:
//!
//! | Kind | Delivery | Ends when |
//! |------|----------|-----------|
//! | [`MonitorKind::Persistent`] | batched by a [`NotificationScheduler`] | stopped |
//! | [`MonitorKind::OneShot`] | first non-empty batch, directly | first batch (`Fired`) or timeout (`TimedOut`) |
//! | [`MonitorKind::Inactivity`] | every batch, directly | no events for the timeout (`Inactive`) |
//!
//! # Concurrency
//!
//! Raw events are processed by a Tokio task that drains the watch channel;
//! one-shot and inactivity expiry runs on a timer task. Both paths race for
//! a single-fire latch (an atomic compare-and-swap taken under the state
//! lock): the first of {timer expiry, terminating event batch, `stop`} wins
//! and every later contender observes the latch and does nothing.
//!
//! Locks are always taken in the order state, timer, watch. Background tasks
//! hold weak references so a dropped monitor is released promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{MonitorError, Result};
use crate::filter::PathFilter;
use crate::notifier::Notifier;
use crate::scheduler::NotificationScheduler;
use crate::timer::DeadlineTimer;
use crate::types::{
    FileEvent, MonitorId, MonitorKind, MonitorState, RawEvent, WatchSpec, INACTIVE, TIMED_OUT,
};
use crate::watch::PlatformWatch;

/// Capacity of the channel between a platform watch and its monitor.
const RAW_EVENT_CAPACITY: usize = 1000;

#[derive(Debug)]
enum Policy {
    Persistent {
        scheduler: NotificationScheduler,
    },
    OneShot {
        timer: Mutex<Option<DeadlineTimer>>,
    },
    Inactivity {
        timer: Mutex<Option<DeadlineTimer>>,
    },
}

impl Policy {
    fn timer(&self) -> Option<&Mutex<Option<DeadlineTimer>>> {
        match self {
            Self::Persistent { .. } => None,
            Self::OneShot { timer } | Self::Inactivity { timer } => Some(timer),
        }
    }
}

#[derive(Debug)]
struct MonitorCore {
    id: MonitorId,
    kind: MonitorKind,
    spec: WatchSpec,
    filter: PathFilter,
    notifier: Notifier,
    policy: Policy,
    state: Mutex<MonitorState>,
    /// Set once a one-shot or inactivity monitor has ended.
    ended: AtomicBool,
    watch: Mutex<Box<dyn PlatformWatch>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

/// A filtered watch over one directory.
///
/// Built by [`MonitorFactory`](crate::factory::MonitorFactory), not started.
/// Dropping a monitor stops it.
#[derive(Debug)]
pub struct Monitor {
    core: Arc<MonitorCore>,
}

impl Monitor {
    pub(crate) fn new(
        id: MonitorId,
        kind: MonitorKind,
        spec: WatchSpec,
        watch: Box<dyn PlatformWatch>,
        notifier: Notifier,
    ) -> Self {
        let policy = match kind {
            MonitorKind::Persistent => Policy::Persistent {
                scheduler: NotificationScheduler::new(
                    spec.timeout,
                    spec.block_size,
                    notifier.clone(),
                ),
            },
            MonitorKind::OneShot => Policy::OneShot {
                timer: Mutex::new(None),
            },
            MonitorKind::Inactivity => Policy::Inactivity {
                timer: Mutex::new(None),
            },
        };

        Self {
            core: Arc::new(MonitorCore {
                id,
                kind,
                filter: PathFilter::new(&spec),
                spec,
                notifier,
                policy,
                state: Mutex::new(MonitorState::Created),
                ended: AtomicBool::new(false),
                watch: Mutex::new(watch),
                event_task: Mutex::new(None),
            }),
        }
    }

    /// Returns the monitor's id.
    #[must_use]
    pub fn id(&self) -> &MonitorId {
        &self.core.id
    }

    /// Returns the monitor's kind.
    #[must_use]
    pub fn kind(&self) -> MonitorKind {
        self.core.kind
    }

    /// Returns the spec the monitor was built with, with its canonical root.
    #[must_use]
    pub fn spec(&self) -> &WatchSpec {
        &self.core.spec
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        *self.core.lock_state()
    }

    /// Returns `true` while the monitor is watching.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Starts watching.
    ///
    /// One-shot and inactivity monitors arm their timeout here. A stopped
    /// persistent monitor can be started again; the other kinds cannot.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::NoRuntime`] outside a Tokio runtime
    /// - [`MonitorError::AlreadyRunning`] if the monitor is running
    /// - [`MonitorError::Terminated`] if the monitor cannot be restarted
    /// - [`MonitorError::Watch`] if the platform watch fails to start
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let core = &self.core;

        let mut state = core.lock_state();
        match *state {
            MonitorState::Created => {}
            MonitorState::Stopped if core.kind == MonitorKind::Persistent => {}
            MonitorState::Running => return Err(MonitorError::AlreadyRunning),
            other => return Err(MonitorError::Terminated(other)),
        }

        let (tx, rx) = mpsc::channel(RAW_EVENT_CAPACITY);
        core.lock_watch().start(tx)?;
        *state = MonitorState::Running;

        match &core.policy {
            Policy::Persistent { scheduler } => scheduler.resume(),
            Policy::OneShot { timer } | Policy::Inactivity { timer } => {
                let weak = Arc::downgrade(core);
                let armed = DeadlineTimer::arm(core.spec.timeout, move || on_timeout(&weak));
                *timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(armed);
            }
        }

        let task = handle.spawn(run_event_loop(Arc::downgrade(core), rx));
        if let Some(previous) = core.lock_event_task().replace(task) {
            previous.abort();
        }

        info!(
            monitor_id = %core.id,
            kind = %core.kind,
            root = %core.spec.root.display(),
            "Monitor started"
        );
        Ok(())
    }

    /// Stops watching and releases the platform watch.
    ///
    /// Stopping a monitor that is not running is a no-op. Pending batched
    /// events of a persistent monitor are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Watch`] if the platform watch fails to stop;
    /// the monitor is `Stopped` regardless.
    pub fn stop(&self) -> Result<()> {
        let core = &self.core;
        {
            let mut state = core.lock_state();
            if !state.is_running() {
                trace!(monitor_id = %core.id, state = %*state, "Stop on idle monitor ignored");
                return Ok(());
            }
            if core.kind != MonitorKind::Persistent && core.ended.swap(true, Ordering::SeqCst) {
                trace!(monitor_id = %core.id, "Monitor is ending itself, stop ignored");
                return Ok(());
            }
            *state = MonitorState::Stopped;
        }

        core.cancel_timer();
        if let Policy::Persistent { scheduler } = &core.policy {
            scheduler.stop();
        }
        if let Some(task) = core.lock_event_task().take() {
            task.abort();
        }
        core.lock_watch().stop()?;

        info!(monitor_id = %core.id, "Monitor stopped");
        Ok(())
    }

    /// Processes a batch of raw events from the platform watch.
    ///
    /// This is the entry point the watch's event task calls; it can also be
    /// driven directly. Events are ignored unless the monitor is running.
    pub fn callback(&self, events: Vec<RawEvent>) {
        self.core.process(events);
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(monitor_id = %self.core.id, error = %e, "Failed to stop monitor on drop");
        }
    }
}

impl MonitorCore {
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_watch(&self) -> MutexGuard<'_, Box<dyn PlatformWatch>> {
        self.watch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_event_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.event_task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process(&self, raw: Vec<RawEvent>) {
        let received = raw.len();
        let filtered = self.filter.apply(raw);
        trace!(monitor_id = %self.id, received, kept = filtered.len(), "Filtered raw events");
        if filtered.is_empty() {
            return;
        }
        let events: Vec<FileEvent> = filtered.iter().map(FileEvent::from).collect();

        match &self.policy {
            Policy::Persistent { scheduler } => {
                if self.lock_state().is_running() {
                    scheduler.schedule(events);
                }
            }
            Policy::OneShot { .. } => {
                if self.try_finish(MonitorState::Fired) {
                    self.deliver(events);
                }
            }
            Policy::Inactivity { timer } => {
                let reset = {
                    let state = self.lock_state();
                    state.is_running()
                        && !self.ended.load(Ordering::SeqCst)
                        && timer
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .as_ref()
                            .is_some_and(DeadlineTimer::reset)
                };
                if reset {
                    self.deliver(events);
                } else {
                    trace!(monitor_id = %self.id, "Inactivity monitor expired, batch dropped");
                }
            }
        }
    }

    /// Moves a running monitor into `terminal` and releases its resources.
    ///
    /// Returns `false` if something else ended the monitor first.
    fn try_finish(&self, terminal: MonitorState) -> bool {
        {
            let mut state = self.lock_state();
            if !state.is_running()
                || self
                    .ended
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                return false;
            }
            *state = terminal;
        }

        self.cancel_timer();
        if let Err(e) = self.lock_watch().stop() {
            warn!(monitor_id = %self.id, error = %e, "Failed to stop platform watch");
        }

        info!(monitor_id = %self.id, state = %terminal, "Monitor stopped itself");
        true
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.policy.timer() {
            if let Some(timer) = timer.lock().unwrap_or_else(PoisonError::into_inner).take() {
                timer.cancel();
            }
        }
    }

    fn deliver(&self, events: Vec<FileEvent>) {
        let count = events.len();
        match self.notifier.notify(events) {
            Ok(()) => debug!(monitor_id = %self.id, count, "Notification queued"),
            Err(e) => warn!(
                monitor_id = %self.id,
                count,
                error = %e,
                "Failed to deliver notification, dropping it"
            ),
        }
    }
}

fn on_timeout(core: &Weak<MonitorCore>) {
    let Some(core) = core.upgrade() else {
        return;
    };

    let (terminal, text) = match core.kind {
        MonitorKind::OneShot => (MonitorState::TimedOut, TIMED_OUT),
        MonitorKind::Inactivity => (MonitorState::Inactive, INACTIVE),
        MonitorKind::Persistent => return,
    };

    if core.try_finish(terminal) {
        core.deliver(vec![FileEvent::system(text)]);
    }
}

async fn run_event_loop(core: Weak<MonitorCore>, mut rx: mpsc::Receiver<Vec<RawEvent>>) {
    while let Some(batch) = rx.recv().await {
        let Some(core) = core.upgrade() else {
            break;
        };
        core.process(batch);
    }
    trace!("Monitor event loop finished");
}
