//! Remote watchers: where a monitor's notifications end up.
//!
//! A [`RemoteWatcher`] is the handle a client registers when it creates a
//! monitor. The server calls [`RemoteWatcher::fs_event_happened`] once per
//! notification, outside the registry lock.
//!
//! - [`HttpWatcher`] POSTs each notification as JSON to a callback URL
//! - [`ChannelWatcher`] hands notifications to an in-process Tokio channel
//!
//! Delivery is at-most-once: there are no retries, and a failure is reported
//! to the caller only so that it can be logged.

use std::fmt;

use chrono::Utc;
use futures_util::future::BoxFuture;
use omerofs_monitor::error::DeliveryError;
use omerofs_monitor::notifier::Notification;
use omerofs_monitor::types::{FileEvent, MonitorId};
use reqwest::{Client, Url};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::ServerError;
use crate::types::CallbackPayload;

/// A client-side receiver of monitor notifications.
pub trait RemoteWatcher: Send + Sync + fmt::Debug {
    /// Delivers one notification for `monitor_id`.
    fn fs_event_happened<'a>(
        &'a self,
        monitor_id: &'a MonitorId,
        events: &'a [FileEvent],
    ) -> BoxFuture<'a, Result<(), DeliveryError>>;

    /// Describes where notifications go, for listings and logs.
    fn target(&self) -> String;
}

/// Delivers notifications by HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpWatcher {
    callback_url: Url,
    client: Client,
}

impl HttpWatcher {
    /// Creates a watcher posting to `callback_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidCallbackUrl`] unless the URL is an
    /// absolute `http` or `https` URL.
    pub fn new(callback_url: &str, client: Client) -> Result<Self, ServerError> {
        let url = Url::parse(callback_url)
            .map_err(|e| ServerError::InvalidCallbackUrl(format!("{callback_url}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ServerError::InvalidCallbackUrl(format!(
                "{callback_url}: scheme must be http or https"
            )));
        }

        Ok(Self {
            callback_url: url,
            client,
        })
    }

    /// Returns the callback URL.
    #[must_use]
    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }
}

impl RemoteWatcher for HttpWatcher {
    fn fs_event_happened<'a>(
        &'a self,
        monitor_id: &'a MonitorId,
        events: &'a [FileEvent],
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            let payload = CallbackPayload {
                monitor_id: monitor_id.clone(),
                events: events.to_vec(),
                sent_at: Utc::now(),
            };

            debug!(
                monitor_id = %monitor_id,
                url = %self.callback_url,
                count = events.len(),
                "Posting notification"
            );

            let response = self
                .client
                .post(self.callback_url.clone())
                .json(&payload)
                .send()
                .await
                .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                trace!(monitor_id = %monitor_id, status = status.as_u16(), "Notification accepted");
                Ok(())
            } else {
                Err(DeliveryError::Rejected {
                    status: status.as_u16(),
                })
            }
        })
    }

    fn target(&self) -> String {
        self.callback_url.to_string()
    }
}

/// Delivers notifications into an unbounded in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelWatcher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelWatcher {
    /// Creates a watcher and the receiver its notifications arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RemoteWatcher for ChannelWatcher {
    fn fs_event_happened<'a>(
        &'a self,
        monitor_id: &'a MonitorId,
        events: &'a [FileEvent],
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        let result = self
            .tx
            .send(Notification {
                monitor_id: monitor_id.clone(),
                events: events.to_vec(),
            })
            .map_err(|_| DeliveryError::ChannelClosed);
        Box::pin(async move { result })
    }

    fn target(&self) -> String {
        "in-process channel".to_string()
    }
}
