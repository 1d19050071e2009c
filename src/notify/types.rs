//! Notification types.
//!
//! [`NotificationMessage`] is the in-process form built by the fan-out;
//! [`NotificationPayload`] is the flat wire form handed to a
//! [`super::DeliveryChannel`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::NotifyError;

/// Kind of event a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// A new friend request was received.
    FriendRequestReceived,
    /// A sent friend request was accepted.
    FriendRequestAccepted,
    /// A sent friend request was rejected.
    FriendRequestRejected,
    /// A received friend request was withdrawn.
    FriendRequestCancelled,
    /// A friend's position changed.
    LocationUpdate,
    /// A friend started sharing their position.
    LocationSharingEnabled,
    /// A friend stopped sharing their position.
    LocationSharingDisabled,
    /// A friend raised an emergency.
    EmergencyAlert,
    /// A friendship was removed.
    FriendshipRemoved,
    /// A friend came online.
    UserOnline,
    /// A friend went offline.
    UserOffline,
    /// General system notice.
    SystemMessage,
}

impl NotificationType {
    /// Every notification type.
    pub const ALL: [Self; 12] = [
        Self::FriendRequestReceived,
        Self::FriendRequestAccepted,
        Self::FriendRequestRejected,
        Self::FriendRequestCancelled,
        Self::LocationUpdate,
        Self::LocationSharingEnabled,
        Self::LocationSharingDisabled,
        Self::EmergencyAlert,
        Self::FriendshipRemoved,
        Self::UserOnline,
        Self::UserOffline,
        Self::SystemMessage,
    ];

    /// Wire name, e.g. `"FRIEND_REQUEST_RECEIVED"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FriendRequestReceived => "FRIEND_REQUEST_RECEIVED",
            Self::FriendRequestAccepted => "FRIEND_REQUEST_ACCEPTED",
            Self::FriendRequestRejected => "FRIEND_REQUEST_REJECTED",
            Self::FriendRequestCancelled => "FRIEND_REQUEST_CANCELLED",
            Self::LocationUpdate => "LOCATION_UPDATE",
            Self::LocationSharingEnabled => "LOCATION_SHARING_ENABLED",
            Self::LocationSharingDisabled => "LOCATION_SHARING_DISABLED",
            Self::EmergencyAlert => "EMERGENCY_ALERT",
            Self::FriendshipRemoved => "FRIENDSHIP_REMOVED",
            Self::UserOnline => "USER_ONLINE",
            Self::UserOffline => "USER_OFFLINE",
            Self::SystemMessage => "SYSTEM_MESSAGE",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Localization key for the human-readable message.
    #[must_use]
    pub const fn message_key(&self) -> &'static str {
        match self {
            Self::FriendRequestReceived => "notification.friend_request.received",
            Self::FriendRequestAccepted => "notification.friend_request.accepted",
            Self::FriendRequestRejected => "notification.friend_request.rejected",
            Self::FriendRequestCancelled => "notification.friend_request.cancelled",
            Self::LocationUpdate => "notification.location.update",
            Self::LocationSharingEnabled => "notification.location.sharing_enabled",
            Self::LocationSharingDisabled => "notification.location.sharing_disabled",
            Self::EmergencyAlert => "notification.emergency.alert",
            Self::FriendshipRemoved => "notification.friendship.removed",
            Self::UserOnline => "notification.user.online",
            Self::UserOffline => "notification.user.offline",
            Self::SystemMessage => "notification.system.message",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Background information.
    Low,
    /// Regular social and location events.
    #[default]
    Normal,
    /// Time-sensitive events.
    High,
    /// Emergencies.
    Urgent,
}

impl Priority {
    /// Wire name, e.g. `"URGENT"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }
}

/// Delivery settings carried with every notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySettings {
    /// Whether the transport should keep the message for offline receivers.
    pub persistent: bool,
    /// Whether the transport should raise a push notification.
    pub push_notification: bool,
    /// Lifetime after `timestamp`, in seconds.
    pub ttl_seconds: u64,
}

impl DeliverySettings {
    /// Regular profile: persistent, no push, 24 hour lifetime.
    pub const DEFAULT: Self = Self {
        persistent: true,
        push_notification: false,
        ttl_seconds: 86_400,
    };

    /// Urgent profile: persistent, push, 1 hour lifetime.
    pub const URGENT: Self = Self {
        persistent: true,
        push_notification: true,
        ttl_seconds: 3_600,
    };
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A notification addressed to one actor.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    /// What happened.
    pub kind: NotificationType,
    /// Actor that caused the event.
    pub sender_id: String,
    /// Actor that should receive the notification.
    pub receiver_id: String,
    /// When the notification was created.
    pub timestamp: DateTime<Utc>,
    /// Delivery priority.
    pub priority: Priority,
    /// Delivery settings.
    pub settings: DeliverySettings,
    /// Event-specific payload.
    pub data: Map<String, Value>,
}

impl NotificationMessage {
    /// Creates a notification with the regular profile.
    #[must_use]
    pub fn new(
        kind: NotificationType,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            timestamp: Utc::now(),
            priority: Priority::Normal,
            settings: DeliverySettings::DEFAULT,
            data: Map::new(),
        }
    }

    /// Creates a notification with the urgent profile.
    #[must_use]
    pub fn urgent(
        kind: NotificationType,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
    ) -> Self {
        Self {
            priority: Priority::Urgent,
            settings: DeliverySettings::URGENT,
            ..Self::new(kind, sender_id, receiver_id)
        }
    }

    /// Attaches event data.
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Overrides the creation time.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Overrides the delivery settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: DeliverySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Instant after which the notification is expired. `None` if the
    /// lifetime does not fit in a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = i64::try_from(self.settings.ttl_seconds).ok()?;
        self.timestamp.checked_add_signed(Duration::try_seconds(ttl)?)
    }

    /// Returns true if `timestamp + ttl` lies in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiry relative to a given instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| expires_at < now)
    }

    /// Checks that the message can be addressed to its receiver.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidMessage`] if the receiver is blank.
    pub fn validate(&self) -> Result<(), NotifyError> {
        if self.receiver_id.trim().is_empty() {
            return Err(NotifyError::InvalidMessage(format!(
                "{} notification has no receiver",
                self.kind
            )));
        }
        Ok(())
    }
}

/// Flat wire form of a notification.
///
/// ```json
/// {
///   "type": "LOCATION_UPDATE",
///   "senderId": "alice",
///   "receiverId": "bob",
///   "timestamp": "2025-01-01T12:00:00Z",
///   "priority": "NORMAL",
///   "persistent": true,
///   "pushNotification": false,
///   "ttlSeconds": 86400,
///   "data": { "latitude": 52.52, "longitude": 13.405 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Actor that caused the event.
    pub sender_id: String,
    /// Addressed actor.
    pub receiver_id: String,
    /// When the notification was created.
    pub timestamp: DateTime<Utc>,
    /// Delivery priority.
    pub priority: Priority,
    /// Keep for offline receivers.
    pub persistent: bool,
    /// Raise a push notification.
    pub push_notification: bool,
    /// Lifetime in seconds.
    pub ttl_seconds: u64,
    /// Event-specific payload.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl From<&NotificationMessage> for NotificationPayload {
    fn from(message: &NotificationMessage) -> Self {
        Self {
            kind: message.kind,
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            timestamp: message.timestamp,
            priority: message.priority,
            persistent: message.settings.persistent,
            push_notification: message.settings.push_notification,
            ttl_seconds: message.settings.ttl_seconds,
            data: message.data.clone(),
        }
    }
}

impl NotificationPayload {
    /// Serializes the payload to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a payload from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or missing required fields.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// What happened to a single delivery that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handed to the transport.
    Delivered,
    /// Dropped because the notification had already expired.
    SkippedExpired,
}

/// Summary of a batch of independent deliveries.
#[derive(Debug, Default)]
pub struct FanoutReport {
    /// Receivers the transport accepted.
    pub delivered: Vec<String>,
    /// Receivers skipped because their notification had expired.
    pub skipped: Vec<String>,
    /// Receivers whose delivery failed, with the reason.
    pub failed: Vec<(String, NotifyError)>,
}

impl FanoutReport {
    /// Number of deliveries attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.skipped.len() + self.failed.len()
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
