//! Notification module for SafeNet.
//!
//! Builds typed notifications and fans them out to a pluggable transport.
//!
//! ```text
//! ┌──────────────────┐   NotificationMessage   ┌────────────────────┐
//! │ ProximityNotifier│ ──────────────────────▶ │ NotificationFanout │
//! └──────────────────┘                         │  validate          │
//!                                              │  skip if expired   │
//!                                              │  timeout per try   │
//!                                              └─────────┬──────────┘
//!                                                        │ NotificationPayload
//!                                                        ▼
//!                                              ┌────────────────────┐
//!                                              │  DeliveryChannel   │
//!                                              │  (InProcessChannel │
//!                                              │   or host-provided)│
//!                                              └────────────────────┘
//! ```
//!
//! Two delivery profiles exist. The regular one is persistent, has no push
//! and lives 24 hours at [`Priority::Normal`]. The urgent one is persistent
//! with push, lives 1 hour, and goes out at [`Priority::Urgent`].
//!
//! Delivery is best effort. Failures are logged and counted and never
//! reach the caller of the operation that produced the notification.

pub mod channel;
pub mod error;
pub mod fanout;
pub mod types;

pub use channel::{DeliveryChannel, InProcessChannel, DEFAULT_SUBSCRIBER_BUFFER};
pub use error::{NotifyError, NotifyResult};
pub use fanout::{DeliveryStatsSnapshot, NotificationFanout, DEFAULT_ATTEMPT_TIMEOUT};
pub use types::{
    DeliveryOutcome, DeliverySettings, FanoutReport, NotificationMessage, NotificationPayload,
    NotificationType, Priority,
};
