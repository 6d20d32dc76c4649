//! Single-fire deadline timer.
//!
//! A [`DeadlineTimer`] runs a callback once its deadline passes. The deadline
//! can be pushed back with [`DeadlineTimer::reset`] until the timer fires.
//!
//! Firing, resetting, and cancelling all decide under the same lock, so the
//! outcome of a race between them is always one of:
//!
//! - the timer fired: `reset` returns `false`, `cancel` returns
//!   [`CancelOutcome::AlreadyFired`]
//! - the timer did not fire and never will after a successful `cancel`
//!
//! An already-fired timer is an expected outcome, not an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Result of [`DeadlineTimer::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The timer was pending and will not fire.
    Cancelled,
    /// The timer had already fired.
    AlreadyFired,
    /// The timer was cancelled before.
    NotArmed,
}

#[derive(Debug)]
struct TimerShared {
    deadline: Mutex<Instant>,
    fired: AtomicBool,
    cancelled: AtomicBool,
}

/// A one-shot timer with a movable deadline.
#[derive(Debug)]
pub struct DeadlineTimer {
    shared: Arc<TimerShared>,
    period: Duration,
    task: JoinHandle<()>,
}

impl DeadlineTimer {
    /// Arms a timer that calls `on_fire` once `period` has passed.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn arm<F>(period: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(TimerShared {
            deadline: Mutex::new(Instant::now() + period),
            fired: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        });

        let task_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            loop {
                let deadline = *task_shared
                    .deadline
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                sleep_until(deadline).await;

                let fire = {
                    let deadline = task_shared
                        .deadline
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    if *deadline > Instant::now() {
                        trace!("Deadline moved, sleeping again");
                        continue;
                    }
                    !task_shared.cancelled.load(Ordering::SeqCst)
                        && task_shared
                            .fired
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                };

                if fire {
                    on_fire();
                }
                return;
            }
        });

        Self {
            shared,
            period,
            task,
        }
    }

    /// Pushes the deadline to one period from now.
    ///
    /// Returns `false` if the timer has already fired or was cancelled.
    pub fn reset(&self) -> bool {
        let mut deadline = self
            .shared
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.has_fired() || self.shared.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        *deadline = Instant::now() + self.period;
        true
    }

    /// Prevents the timer from firing.
    pub fn cancel(&self) -> CancelOutcome {
        let _deadline = self
            .shared
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.has_fired() {
            return CancelOutcome::AlreadyFired;
        }
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return CancelOutcome::NotArmed;
        }
        self.task.abort();
        CancelOutcome::Cancelled
    }

    /// Returns `true` once the timer has fired.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.shared.fired.load(Ordering::SeqCst)
    }

    /// Returns the period the timer was armed with.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        // Never abort a callback that is already running.
        if !self.has_fired() {
            self.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn fires_once_after_period() {
        let (count, on_fire) = counter();
        let timer = DeadlineTimer::arm(Duration::from_millis(50), on_fire);

        sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(timer.has_fired());
        assert_eq!(timer.cancel(), CancelOutcome::AlreadyFired);
        assert!(!timer.reset());
    }

    #[tokio::test]
    async fn reset_pushes_deadline_back() {
        let (count, on_fire) = counter();
        let timer = DeadlineTimer::arm(Duration::from_millis(100), on_fire);

        for _ in 0..4 {
            sleep(Duration::from_millis(50)).await;
            assert!(timer.reset());
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(250)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let (count, on_fire) = counter();
        let timer = DeadlineTimer::arm(Duration::from_millis(50), on_fire);

        assert_eq!(timer.cancel(), CancelOutcome::Cancelled);
        assert_eq!(timer.cancel(), CancelOutcome::NotArmed);
        assert!(!timer.reset());

        sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropping_timer_prevents_firing() {
        let (count, on_fire) = counter();
        drop(DeadlineTimer::arm(Duration::from_millis(30), on_fire));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
