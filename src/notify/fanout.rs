//! Notification fan-out.
//!
//! Each delivery is independent: it is validated, skipped if expired, and
//! bounded by a per-attempt timeout. A batch runs its deliveries
//! concurrently so one slow receiver does not hold up the rest.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};
use serde_json::{Map, Value};

use super::channel::DeliveryChannel;
use super::error::{NotifyError, NotifyResult};
use super::types::{DeliveryOutcome, FanoutReport, NotificationMessage, NotificationPayload, NotificationType};
use crate::identity::ActorId;

/// Default bound on a single delivery attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Cumulative delivery counters.
#[derive(Debug, Default)]
struct DeliveryStats {
    delivered: AtomicU64,
    skipped_expired: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStatsSnapshot {
    /// Deliveries the transport accepted.
    pub delivered: u64,
    /// Deliveries dropped because the notification had expired.
    pub skipped_expired: u64,
    /// Deliveries that failed or timed out.
    pub failed: u64,
}

/// Builds notifications and hands them to a [`DeliveryChannel`].
pub struct NotificationFanout {
    channel: Arc<dyn DeliveryChannel>,
    attempt_timeout: Duration,
    stats: DeliveryStats,
}

impl NotificationFanout {
    /// Creates a fan-out with [`DEFAULT_ATTEMPT_TIMEOUT`].
    #[must_use]
    pub fn new(channel: Arc<dyn DeliveryChannel>) -> Self {
        Self::with_timeout(channel, DEFAULT_ATTEMPT_TIMEOUT)
    }

    /// Creates a fan-out with a custom per-attempt timeout.
    #[must_use]
    pub fn with_timeout(channel: Arc<dyn DeliveryChannel>, attempt_timeout: Duration) -> Self {
        Self {
            channel,
            attempt_timeout,
            stats: DeliveryStats::default(),
        }
    }

    /// Bound on a single delivery attempt.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Builds a notification from `sender` to `receiver`.
    ///
    /// `urgent` selects the urgent profile; otherwise the regular one.
    #[must_use]
    pub fn build(
        kind: NotificationType,
        sender: &ActorId,
        receiver: &ActorId,
        data: Option<Map<String, Value>>,
        urgent: bool,
    ) -> NotificationMessage {
        let message = if urgent {
            NotificationMessage::urgent(kind, sender.as_str(), receiver.as_str())
        } else {
            NotificationMessage::new(kind, sender.as_str(), receiver.as_str())
        };
        match data {
            Some(data) => message.with_data(data),
            None => message,
        }
    }

    /// Delivers a notification to its receiver.
    ///
    /// # Errors
    ///
    /// - [`NotifyError::InvalidMessage`] if the receiver is blank
    /// - [`NotifyError::Timeout`] if the transport exceeds the attempt bound
    /// - Any error the transport reports
    pub async fn deliver_to_actor(&self, message: &NotificationMessage) -> NotifyResult<DeliveryOutcome> {
        message.validate()?;
        if self.skip_if_expired(message, &message.receiver_id) {
            return Ok(DeliveryOutcome::SkippedExpired);
        }

        let payload = NotificationPayload::from(message);
        self.attempt(
            &message.receiver_id,
            self.channel.send_to_actor(&message.receiver_id, &payload),
        )
        .await
    }

    /// Publishes a notification to a broadcast topic.
    ///
    /// # Errors
    ///
    /// - [`NotifyError::InvalidMessage`] if the topic is blank
    /// - [`NotifyError::Timeout`] if the transport exceeds the attempt bound
    /// - Any error the transport reports
    pub async fn deliver_to_topic(
        &self,
        topic: &str,
        message: &NotificationMessage,
    ) -> NotifyResult<DeliveryOutcome> {
        if topic.trim().is_empty() {
            return Err(NotifyError::InvalidMessage(format!(
                "{} notification has no topic",
                message.kind
            )));
        }
        if self.skip_if_expired(message, topic) {
            return Ok(DeliveryOutcome::SkippedExpired);
        }

        let payload = NotificationPayload::from(message);
        self.attempt(topic, self.channel.send_to_topic(topic, &payload))
            .await
    }

    /// Delivers each message to its receiver concurrently.
    ///
    /// Never fails as a whole; per-receiver failures are collected in the
    /// report.
    pub async fn deliver_all(&self, messages: &[NotificationMessage]) -> FanoutReport {
        let results = join_all(messages.iter().map(|m| self.deliver_to_actor(m))).await;

        let mut report = FanoutReport::default();
        for (message, result) in messages.iter().zip(results) {
            let receiver = message.receiver_id.clone();
            match result {
                Ok(DeliveryOutcome::Delivered) => report.delivered.push(receiver),
                Ok(DeliveryOutcome::SkippedExpired) => report.skipped.push(receiver),
                Err(e) => report.failed.push((receiver, e)),
            }
        }
        report
    }

    /// Returns the cumulative delivery counters.
    #[must_use]
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            skipped_expired: self.stats.skipped_expired.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    fn skip_if_expired(&self, message: &NotificationMessage, target: &str) -> bool {
        if !message.is_expired() {
            return false;
        }
        warn!("Skipping expired {} notification for {target}", message.kind);
        self.stats.skipped_expired.fetch_add(1, Ordering::Relaxed);
        true
    }

    async fn attempt<F>(&self, target: &str, send: F) -> NotifyResult<DeliveryOutcome>
    where
        F: Future<Output = NotifyResult<()>>,
    {
        match tokio::time::timeout(self.attempt_timeout, send).await {
            Ok(Ok(())) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!("Notification delivered to {target}");
                Ok(DeliveryOutcome::Delivered)
            }
            Ok(Err(e)) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Notification delivery to {target} failed: {e}");
                Err(e)
            }
            Err(_) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Notification delivery to {target} timed out after {:?}",
                    self.attempt_timeout
                );
                Err(NotifyError::Timeout(target.to_string()))
            }
        }
    }
}
