//! Delivery transports.
//!
//! [`DeliveryChannel`] is the seam between the fan-out and whatever carries
//! notifications to devices. [`InProcessChannel`] routes payloads to tokio
//! mpsc subscribers and is what hosts embedding the core in one process use.

use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

use super::error::NotifyResult;
use super::types::NotificationPayload;

/// Buffer size of each subscriber queue.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 100;

/// A transport that hands notifications to actors or topics.
///
/// Implementations must be safe to call concurrently. Whether an actor is
/// online is the transport's concern; the fan-out treats `Ok(())` as
/// accepted.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Delivers to one actor's private destination.
    async fn send_to_actor(&self, receiver: &str, payload: &NotificationPayload) -> NotifyResult<()>;

    /// Delivers to every subscriber of a broadcast topic.
    async fn send_to_topic(&self, topic: &str, payload: &NotificationPayload) -> NotifyResult<()>;
}

type Subscribers = RwLock<HashMap<String, Vec<mpsc::Sender<NotificationPayload>>>>;

/// In-process transport backed by tokio mpsc queues.
///
/// Payloads for an actor or topic without live subscribers are dropped, and
/// so are payloads for a subscriber whose queue is full. Sending never
/// waits on a slow subscriber. Subscribers whose receiver was dropped are
/// pruned on the next send.
pub struct InProcessChannel {
    actors: Subscribers,
    topics: Subscribers,
    buffer: usize,
}

impl Default for InProcessChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessChannel {
    /// Creates a channel with [`DEFAULT_SUBSCRIBER_BUFFER`] per subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Creates a channel with a custom per-subscriber buffer.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            actors: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Receives every notification addressed to `actor`.
    pub async fn subscribe_actor(&self, actor: &str) -> mpsc::Receiver<NotificationPayload> {
        self.subscribe(&self.actors, actor).await
    }

    /// Receives every notification published to `topic`.
    pub async fn subscribe_topic(&self, topic: &str) -> mpsc::Receiver<NotificationPayload> {
        self.subscribe(&self.topics, topic).await
    }

    /// Number of live subscribers for `actor`.
    pub async fn actor_subscriber_count(&self, actor: &str) -> usize {
        Self::live_count(&self.actors, actor).await
    }

    /// Number of live subscribers for `topic`.
    pub async fn topic_subscriber_count(&self, topic: &str) -> usize {
        Self::live_count(&self.topics, topic).await
    }

    async fn subscribe(&self, map: &Subscribers, key: &str) -> mpsc::Receiver<NotificationPayload> {
        let (tx, rx) = mpsc::channel(self.buffer);
        map.write().await.entry(key.to_string()).or_default().push(tx);
        debug!("New subscriber for {key}");
        rx
    }

    async fn live_count(map: &Subscribers, key: &str) -> usize {
        map.read()
            .await
            .get(key)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    async fn publish(map: &Subscribers, key: &str, payload: &NotificationPayload) {
        // Snapshot so a slow subscriber does not hold the lock.
        let senders = map.read().await.get(key).cloned().unwrap_or_default();
        if senders.is_empty() {
            trace!("No subscribers for {key}, dropping {}", payload.kind);
            return;
        }

        let mut saw_closed = false;
        for tx in senders {
            match tx.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber queue for {key} is full, dropping {}", payload.kind);
                }
                Err(TrySendError::Closed(_)) => saw_closed = true,
            }
        }

        if saw_closed {
            let mut map = map.write().await;
            if let Some(senders) = map.get_mut(key) {
                senders.retain(|tx| !tx.is_closed());
                if senders.is_empty() {
                    map.remove(key);
                }
            }
        }
    }
}

#[async_trait]
impl DeliveryChannel for InProcessChannel {
    async fn send_to_actor(&self, receiver: &str, payload: &NotificationPayload) -> NotifyResult<()> {
        Self::publish(&self.actors, receiver, payload).await;
        Ok(())
    }

    async fn send_to_topic(&self, topic: &str, payload: &NotificationPayload) -> NotifyResult<()> {
        Self::publish(&self.topics, topic, payload).await;
        Ok(())
    }
}
