//! Error types for notification delivery.
//!
//! Delivery failures are recoverable. The fan-out logs and counts them, and
//! the proximity notifier never lets them fail the operation that
//! triggered the notification.

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur while building or delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The message is missing a required field.
    #[error("Invalid notification: {0}")]
    InvalidMessage(String),

    /// The transport refused or failed to accept the message.
    #[error("Failed to deliver notification to {target}: {reason}")]
    Delivery {
        /// The receiver or topic.
        target: String,
        /// Transport-specific reason.
        reason: String,
    },

    /// The transport did not complete within the attempt bound.
    #[error("Notification delivery to {0} timed out")]
    Timeout(String),
}

impl NotifyError {
    /// Returns the failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMessage(_) => ErrorKind::Validation,
            Self::Delivery { .. } | Self::Timeout(_) => ErrorKind::Delivery,
        }
    }

    /// Creates a [`NotifyError::Delivery`].
    #[must_use]
    pub fn delivery(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delivery {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for notification operations.
pub type NotifyResult<T> = std::result::Result<T, NotifyError>;
