//! Notification batching for persistent monitors.
//!
//! [`NotificationScheduler`] collapses bursts of file events into fewer
//! notifications. Events accumulate in a pending batch which is flushed when
//! either:
//!
//! - it reaches `block_size` events, or
//! - `timeout` has passed since it went from empty to non-empty.
//!
//! Flushing hands the batch to the [`Notifier`], which never blocks, so the
//! batch is read, cleared, and handed off under one lock. A batch is flushed
//! exactly once and never partially, and batches leave in the order their
//! events were scheduled. Delivery failures are logged and not retried.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::notifier::Notifier;
use crate::timer::DeadlineTimer;
use crate::types::FileEvent;

#[derive(Debug, Default)]
struct SchedulerState {
    pending: Vec<FileEvent>,
    timer: Option<DeadlineTimer>,
    /// Bumped whenever the armed timer is retired, so a timer that already
    /// woke up cannot flush a later batch.
    generation: u64,
    stopped: bool,
}

#[derive(Debug)]
struct SchedulerInner {
    timeout: Duration,
    block_size: usize,
    notifier: Notifier,
    state: Mutex<SchedulerState>,
}

/// Batches events and flushes them by size or age.
#[derive(Debug, Clone)]
pub struct NotificationScheduler {
    inner: Arc<SchedulerInner>,
}

impl NotificationScheduler {
    /// Creates an idle scheduler.
    ///
    /// A `block_size` of zero is treated as one.
    #[must_use]
    pub fn new(timeout: Duration, block_size: usize, notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                timeout,
                block_size: block_size.max(1),
                notifier,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Adds events to the pending batch.
    ///
    /// Every full block is flushed immediately; a remainder waits for the
    /// timeout. Must be called from within a Tokio runtime.
    pub fn schedule(&self, events: Vec<FileEvent>) {
        if events.is_empty() {
            return;
        }

        let mut state = self.inner.lock();
        if state.stopped {
            trace!(
                monitor_id = %self.inner.notifier.monitor_id(),
                count = events.len(),
                "Scheduler stopped, discarding events"
            );
            return;
        }

        state.pending.extend(events);

        let block_size = self.inner.block_size;
        while state.pending.len() >= block_size {
            let block: Vec<FileEvent> = state.pending.drain(..block_size).collect();
            retire_timer(&mut state);
            debug!(
                monitor_id = %self.inner.notifier.monitor_id(),
                count = block.len(),
                "Block size reached, flushing"
            );
            self.inner.deliver(block);
        }

        if !state.pending.is_empty() && state.timer.is_none() {
            let generation = state.generation;
            let weak = Arc::downgrade(&self.inner);
            state.timer = Some(DeadlineTimer::arm(self.inner.timeout, move || {
                on_timer(&weak, generation);
            }));
        }
    }

    /// Cancels the timer and discards pending events.
    ///
    /// Further calls to [`schedule`](Self::schedule) are ignored until
    /// [`resume`](Self::resume). Returns the number of discarded events.
    pub fn stop(&self) -> usize {
        let mut state = self.inner.lock();
        retire_timer(&mut state);
        state.stopped = true;
        let discarded = state.pending.len();
        state.pending.clear();

        if discarded > 0 {
            debug!(
                monitor_id = %self.inner.notifier.monitor_id(),
                count = discarded,
                "Discarded unflushed events"
            );
        }
        discarded
    }

    /// Accepts events again after [`stop`](Self::stop).
    pub fn resume(&self) {
        self.inner.lock().stopped = false;
    }

    /// Returns the number of events waiting to be flushed.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, events: Vec<FileEvent>) {
        let count = events.len();
        if let Err(e) = self.notifier.notify(events) {
            warn!(
                monitor_id = %self.notifier.monitor_id(),
                count,
                error = %e,
                "Failed to deliver notification, dropping it"
            );
        }
    }
}

/// Cancels the armed timer, if any, and invalidates it.
fn retire_timer(state: &mut SchedulerState) {
    if let Some(timer) = state.timer.take() {
        timer.cancel();
    }
    state.generation = state.generation.wrapping_add(1);
}

fn on_timer(inner: &Weak<SchedulerInner>, generation: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let mut state = inner.lock();
    if state.generation != generation || state.stopped {
        trace!(monitor_id = %inner.notifier.monitor_id(), "Stale flush timer ignored");
        return;
    }

    // The timer fired, so dropping it here does not abort this callback.
    state.timer = None;
    state.generation = state.generation.wrapping_add(1);

    if state.pending.is_empty() {
        return;
    }

    let batch = std::mem::take(&mut state.pending);
    debug!(
        monitor_id = %inner.notifier.monitor_id(),
        count = batch.len(),
        "Timeout reached, flushing"
    );
    inner.deliver(batch);
}
