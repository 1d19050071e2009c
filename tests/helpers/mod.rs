//! Reusable helpers for SafeNet integration tests.
//!
//! Every test opens its own core in a unique directory so tests can run in
//! parallel against real `SQLite` files.

#![allow(dead_code)]

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use safenet_core::identity::{Actor, ActorId, InMemoryDirectory};
use safenet_core::notify::{DeliveryChannel, NotificationPayload, NotifyError, NotifyResult};
use safenet_core::{CoreConfig, SafeNetCore};

/// Atomic counter for unique test directory names.
static HELPER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates a unique temporary directory for test isolation.
pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let id = HELPER_COUNTER.fetch_add(1, Ordering::SeqCst);
    env::temp_dir().join(format!(
        "safenet_test_{}_{}_{}",
        prefix,
        std::process::id(),
        id
    ))
}

/// Removes a temporary test directory. Ignores errors silently.
pub fn cleanup_dir(dir: &PathBuf) {
    let _ = std::fs::remove_dir_all(dir);
}

/// Shorthand for an actor ID.
pub fn id(s: &str) -> ActorId {
    ActorId::from(s)
}

/// Directory containing one actor per name, with the name as username.
pub fn directory(names: &[&str]) -> Arc<InMemoryDirectory> {
    Arc::new(InMemoryDirectory::with_actors(
        names.iter().map(|name| Actor::new(*name, *name)),
    ))
}

/// Opens a core on disk in a fresh directory.
pub fn open_core(
    prefix: &str,
    names: &[&str],
    channel: Arc<dyn DeliveryChannel>,
) -> (SafeNetCore, PathBuf) {
    let dir = unique_temp_dir(prefix);
    let config = CoreConfig {
        delivery_timeout_ms: 200,
        ..CoreConfig::with_data_dir(dir.clone())
    };
    let core = SafeNetCore::open(config, directory(names), channel).expect("core should open");
    (core, dir)
}

/// Channel that records every payload and can be told to fail for some
/// receivers or stall for others.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<NotificationPayload>>,
    failing: Vec<String>,
    stalled: Vec<String>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries to these receivers fail.
    pub fn failing_for(mut self, receivers: &[&str]) -> Self {
        self.failing = receivers.iter().map(ToString::to_string).collect();
        self
    }

    /// Deliveries to these receivers never complete.
    pub fn stalled_for(mut self, receivers: &[&str]) -> Self {
        self.stalled = receivers.iter().map(ToString::to_string).collect();
        self
    }

    /// Everything accepted so far.
    pub fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().expect("lock").clone()
    }

    /// Receivers of accepted payloads, in order.
    pub fn receivers(&self) -> Vec<String> {
        self.sent().into_iter().map(|p| p.receiver_id).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().expect("lock").clear();
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send_to_actor(&self, receiver: &str, payload: &NotificationPayload) -> NotifyResult<()> {
        if self.failing.iter().any(|r| r == receiver) {
            return Err(NotifyError::delivery(receiver, "transport unavailable"));
        }
        if self.stalled.iter().any(|r| r == receiver) {
            std::future::pending::<()>().await;
        }
        self.sent.lock().expect("lock").push(payload.clone());
        Ok(())
    }

    async fn send_to_topic(&self, topic: &str, payload: &NotificationPayload) -> NotifyResult<()> {
        let mut payload = payload.clone();
        payload.receiver_id = format!("topic:{topic}");
        self.sent.lock().expect("lock").push(payload);
        Ok(())
    }
}
