//! Integration tests for notification fan-out driven by graph and location
//! changes.
//!
//! These tests verify:
//! - Audiences are derived from the friend graph at commit time
//! - The visibility gate, and the emergency override that ignores it
//! - Delivery failures and stalls never fail or undo an operation
//! - Notification expiry

mod helpers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use helpers::{cleanup_dir, id, open_core, RecordingChannel};
use safenet_core::location::LocationUpdate;
use safenet_core::notify::{
    DeliveryOutcome, DeliverySettings, NotificationMessage, NotificationType, Priority,
};
use safenet_core::{ErrorKind, SafeNetCore};

async fn befriend(core: &SafeNetCore, a: &str, b: &str) {
    let request = core
        .notifier()
        .send_friend_request(&id(a), &id(b))
        .await
        .unwrap();
    core.notifier()
        .accept_friend_request(request.id, &id(b))
        .await
        .unwrap();
}

mod audience_tests {
    use super::*;

    #[tokio::test]
    async fn location_update_reaches_current_friends() {
        let channel = Arc::new(RecordingChannel::new());
        let (core, dir) = open_core("audience", &["alice", "bob", "carol", "dave"], channel.clone());
        befriend(&core, "alice", "bob").await;
        befriend(&core, "carol", "alice").await;
        channel.clear();

        core.notifier()
            .update_location(&id("alice"), &LocationUpdate::new(52.52, 13.405))
            .await
            .unwrap();

        let mut receivers = channel.receivers();
        receivers.sort();
        assert_eq!(receivers, vec!["bob".to_string(), "carol".to_string()]);
        assert!(channel
            .sent()
            .iter()
            .all(|p| p.kind == NotificationType::LocationUpdate && p.priority == Priority::Normal));

        drop(core);
        cleanup_dir(&dir);
    }

    #[tokio::test]
    async fn removed_friend_stops_receiving_updates() {
        let channel = Arc::new(RecordingChannel::new());
        let (core, dir) = open_core("removed", &["alice", "bob"], channel.clone());
        befriend(&core, "alice", "bob").await;
        core.notifier()
            .remove_friendship(&id("alice"), &id("bob"), &id("bob"))
            .await
            .unwrap();
        channel.clear();

        core.notifier()
            .update_location(&id("alice"), &LocationUpdate::new(1.0, 1.0))
            .await
            .unwrap();

        assert!(channel.sent().is_empty());

        drop(core);
        cleanup_dir(&dir);
    }
}

mod privacy_tests {
    use super::*;

    #[tokio::test]
    async fn hidden_update_notifies_nobody() {
        let channel = Arc::new(RecordingChannel::new());
        let (core, dir) = open_core("hidden", &["alice", "bob"], channel.clone());
        befriend(&core, "alice", "bob").await;
        channel.clear();

        let outcome = core
            .notifier()
            .update_location(&id("alice"), &LocationUpdate::new(1.0, 1.0).with_visibility(false))
            .await
            .unwrap();

        assert!(!outcome.position.visible_to_friends);
        assert!(channel.sent().is_empty());
        assert!(core
            .notifier()
            .friends_locations(&id("bob"))
            .unwrap()
            .is_empty());

        drop(core);
        cleanup_dir(&dir);
    }

    #[tokio::test]
    async fn emergency_reaches_every_friend_while_hidden() {
        let channel = Arc::new(RecordingChannel::new());
        let (core, dir) = open_core("emergency", &["alice", "bob", "carol"], channel.clone());
        befriend(&core, "alice", "bob").await;
        befriend(&core, "alice", "carol").await;
        for actor in ["alice", "bob", "carol"] {
            core.notifier()
                .update_location(&id(actor), &LocationUpdate::new(1.0, 1.0).with_visibility(false))
                .await
                .unwrap();
        }
        channel.clear();

        let report = core
            .notifier()
            .share_emergency_location(&id("alice"), Some("help"))
            .await
            .unwrap();

        assert_eq!(report.delivered.len(), 2);
        let sent = channel.sent();
        assert_eq!(sent.len(), 2);
        for payload in &sent {
            assert_eq!(payload.kind, NotificationType::EmergencyAlert);
            assert_eq!(payload.priority, Priority::Urgent);
            assert_eq!(payload.ttl_seconds, DeliverySettings::URGENT.ttl_seconds);
            assert_eq!(payload.data["message"], "help");
        }

        drop(core);
        cleanup_dir(&dir);
    }

    #[tokio::test]
    async fn emergency_without_position_fails() {
        let channel = Arc::new(RecordingChannel::new());
        let (core, dir) = open_core("no_position", &["alice", "bob"], channel.clone());
        befriend(&core, "alice", "bob").await;
        channel.clear();

        let err = core
            .notifier()
            .share_emergency_location(&id("alice"), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(channel.sent().is_empty());

        drop(core);
        cleanup_dir(&dir);
    }
}

mod failure_isolation_tests {
    use super::*;

    #[tokio::test]
    async fn failing_recipient_does_not_block_others() {
        let channel = Arc::new(RecordingChannel::new().failing_for(&["bob"]));
        let (core, dir) = open_core("failing", &["alice", "bob", "carol"], channel.clone());
        befriend(&core, "alice", "bob").await;
        befriend(&core, "alice", "carol").await;
        channel.clear();

        let outcome = core
            .notifier()
            .update_location(&id("alice"), &LocationUpdate::new(3.0, 4.0))
            .await
            .unwrap();

        assert!(outcome.created());
        assert_eq!(channel.receivers(), vec!["carol".to_string()]);
        assert!(core.fanout().stats().failed >= 1);

        drop(core);
        cleanup_dir(&dir);
    }

    #[tokio::test]
    async fn failed_notification_keeps_committed_request() {
        let channel = Arc::new(RecordingChannel::new().failing_for(&["bob"]));
        let (core, dir) = open_core("kept", &["alice", "bob"], channel.clone());

        let request = core
            .notifier()
            .send_friend_request(&id("alice"), &id("bob"))
            .await
            .unwrap();

        assert!(channel.sent().is_empty());
        assert!(core.graph().request(request.id).unwrap().is_some());
        assert_eq!(core.fanout().stats().failed, 1);

        drop(core);
        cleanup_dir(&dir);
    }

    #[tokio::test]
    async fn stalled_recipient_is_bounded_by_timeout() {
        let channel = Arc::new(RecordingChannel::new().stalled_for(&["bob"]));
        let (core, dir) = open_core("stalled", &["alice", "bob", "carol"], channel.clone());
        befriend(&core, "alice", "carol").await;
        befriend(&core, "alice", "bob").await;
        channel.clear();

        let started = Instant::now();
        core.notifier()
            .update_location(&id("alice"), &LocationUpdate::new(1.0, 1.0))
            .await
            .unwrap();

        // The helper sets a 200 ms attempt bound.
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(channel.receivers(), vec!["carol".to_string()]);

        drop(core);
        cleanup_dir(&dir);
    }
}

mod expiry_tests {
    use super::*;

    #[tokio::test]
    async fn expired_notification_is_skipped() {
        let channel = Arc::new(RecordingChannel::new());
        let (core, dir) = open_core("expired", &["alice", "bob"], channel.clone());

        let message = NotificationMessage::new(NotificationType::SystemMessage, "system", "bob")
            .with_settings(DeliverySettings {
                ttl_seconds: 1,
                ..DeliverySettings::DEFAULT
            })
            .with_timestamp(Utc::now() - chrono::Duration::seconds(2));

        assert!(message.is_expired());
        let outcome = core.fanout().deliver_to_actor(&message).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::SkippedExpired);
        assert!(channel.sent().is_empty());
        assert_eq!(core.fanout().stats().skipped_expired, 1);

        drop(core);
        cleanup_dir(&dir);
    }

    #[test]
    fn ttl_boundary() {
        let created = Utc::now();
        let message = NotificationMessage::new(NotificationType::SystemMessage, "system", "bob")
            .with_timestamp(created)
            .with_settings(DeliverySettings {
                ttl_seconds: 1,
                ..DeliverySettings::DEFAULT
            });

        assert!(!message.is_expired_at(created));
        assert!(message.is_expired_at(created + chrono::Duration::milliseconds(1_500)));
    }
}
