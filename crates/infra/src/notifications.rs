//! Fire-and-forget notification signals.
//!
//! Delivery (email, SMS) happens downstream; this core only emits the signal.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use travelos_booking::BookingLifecycleStatus;
use travelos_core::{BookingId, CustomerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SendCompletionEmail,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::SendCompletionEmail => "send_completion_email",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub booking_id: BookingId,
    pub booking_code: String,
    pub customer_id: CustomerId,
    pub status: BookingLifecycleStatus,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

#[async_trait]
impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        (**self).notify(notification).await
    }
}

/// Emits each notification as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        info!(
            signal = notification.kind.as_str(),
            booking_id = %notification.booking_id,
            booking_code = %notification.booking_code,
            customer_id = %notification.customer_id,
            status = %notification.status,
            "notification signal"
        );
        Ok(())
    }
}

/// Keeps every notification in memory. For tests/dev.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent
            .write()
            .map_err(|_| anyhow::anyhow!("notification log lock poisoned"))?
            .push(notification);
        Ok(())
    }
}
