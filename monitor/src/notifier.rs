//! Hand-off point between a monitor and whoever delivers its notifications.
//!
//! Each monitor is given a [`Notifier`] at construction. Notifications go into
//! a bounded Tokio channel with `try_send`, so a monitor never waits on a slow
//! receiver. The receiving half is drained by a delivery task owned by the
//! monitor server (or by the caller when the engine is embedded directly).

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::DeliveryError;
use crate::types::{FileEvent, MonitorId};

/// Default capacity of a monitor's notification channel.
pub const DEFAULT_DELIVERY_CAPACITY: usize = 1024;

/// A batch of events produced by one monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Monitor that produced the batch.
    pub monitor_id: MonitorId,

    /// Events in delivery order.
    pub events: Vec<FileEvent>,
}

/// Sending half of a monitor's notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    monitor_id: MonitorId,
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Wraps an existing channel sender.
    pub fn new(monitor_id: MonitorId, tx: mpsc::Sender<Notification>) -> Self {
        Self { monitor_id, tx }
    }

    /// Creates a notifier together with the receiver that drains it.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn channel(monitor_id: MonitorId, capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(monitor_id, tx), rx)
    }

    /// Returns the id of the monitor this notifier belongs to.
    #[must_use]
    pub fn monitor_id(&self) -> &MonitorId {
        &self.monitor_id
    }

    /// Queues a notification without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::QueueFull`] if the channel is full and
    /// [`DeliveryError::ChannelClosed`] if the receiver is gone. In both cases
    /// the notification is dropped.
    pub fn notify(&self, events: Vec<FileEvent>) -> Result<(), DeliveryError> {
        let notification = Notification {
            monitor_id: self.monitor_id.clone(),
            events,
        };

        self.tx.try_send(notification).map_err(|e| match e {
            TrySendError::Full(n) => DeliveryError::QueueFull {
                dropped: n.events.len(),
            },
            TrySendError::Closed(_) => DeliveryError::ChannelClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn notify_queues_in_order() {
        let (notifier, mut rx) = Notifier::channel(MonitorId::from("m1"), 4);

        assert_ok!(notifier.notify(vec![FileEvent::new("/a", EventType::Create)]));
        assert_ok!(notifier.notify(vec![FileEvent::new("/b", EventType::Delete)]));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.monitor_id.as_str(), "m1");
        assert_eq!(first.events[0].file_id, "/a");
        assert_eq!(rx.try_recv().unwrap().events[0].file_id, "/b");
    }

    #[test]
    fn full_channel_drops_notification() {
        let (notifier, _rx) = Notifier::channel(MonitorId::from("m1"), 1);
        let events = vec![
            FileEvent::new("/a", EventType::Create),
            FileEvent::new("/b", EventType::Create),
        ];

        assert_ok!(notifier.notify(events.clone()));
        assert_eq!(
            notifier.notify(events),
            Err(DeliveryError::QueueFull { dropped: 2 })
        );
    }

    #[test]
    fn closed_channel_reports_error() {
        let (notifier, rx) = Notifier::channel(MonitorId::from("m1"), 1);
        drop(rx);

        let err = assert_err!(notifier.notify(vec![FileEvent::system("Inactive")]));
        assert_eq!(err, DeliveryError::ChannelClosed);
    }
}
