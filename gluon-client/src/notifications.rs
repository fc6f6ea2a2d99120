//! User-facing notifications for settled writes.
//!
//! The orchestrator only publishes [`MutationOutcome`]s. A
//! [`NotificationRelay`] subscribes to that channel and turns each outcome
//! into exactly one [`Notification`] for a [`NotificationSink`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::mutation::MutationOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    /// Explorer link for the transaction, on success.
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            link: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

impl From<&MutationOutcome> for Notification {
    fn from(outcome: &MutationOutcome) -> Self {
        match &outcome.result {
            Ok(token) => {
                let notification = Notification::new(
                    NotificationLevel::Success,
                    format!("Transaction sent: {}", token),
                );
                match outcome.explorer_url() {
                    Some(url) => notification.with_link(url),
                    None => notification,
                }
            }
            Err(err) => Notification::new(
                NotificationLevel::Error,
                format!("Failed to {} journal entry: {}", outcome.kind, err),
            ),
        }
    }
}

/// Receiver of notifications. Delivery is fire-and-forget.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => {
                error!(link = ?notification.link, "{}", notification.message)
            }
            NotificationLevel::Warning => {
                warn!(link = ?notification.link, "{}", notification.message)
            }
            NotificationLevel::Info | NotificationLevel::Success => {
                info!(link = ?notification.link, "{}", notification.message)
            }
        }
    }
}

/// Sink that keeps notifications in memory until drained.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    items: Mutex<Vec<Notification>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NotificationSink for NotificationCenter {
    fn notify(&self, notification: Notification) {
        self.lock().push(notification);
    }
}

/// Forwards mutation outcomes to a sink until the channel closes.
pub struct NotificationRelay {
    handle: JoinHandle<u64>,
}

impl NotificationRelay {
    /// Start relaying from `outcomes` to `sink`.
    pub fn spawn(
        mut outcomes: broadcast::Receiver<MutationOutcome>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut delivered = 0u64;
            loop {
                match outcomes.recv().await {
                    Ok(outcome) => {
                        sink.notify(Notification::from(&outcome));
                        delivered += 1;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification relay lagged, outcomes were dropped");
                        sink.notify(Notification::new(
                            NotificationLevel::Warning,
                            format!("{} transaction notifications were dropped", skipped),
                        ));
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(delivered, "Outcome channel closed, relay stopping");
                        break;
                    }
                }
            }
            delivered
        });
        Self { handle }
    }

    /// Stop relaying immediately.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the channel to close. Returns the number of outcomes relayed.
    pub async fn join(self) -> u64 {
        self.handle.await.unwrap_or(0)
    }
}
