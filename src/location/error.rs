//! Error types for location operations.

use thiserror::Error;

use crate::error::ErrorKind;
use crate::identity::ActorId;

/// Errors that can occur while validating, storing or querying positions.
#[derive(Debug, Error)]
pub enum LocationError {
    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error from `SQLite`.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A coordinate or measurement is outside its allowed range.
    #[error("Invalid {field}: {value} (must be between {min} and {max})")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },

    /// Other malformed input, such as an inverted bounding box.
    #[error("Invalid location input: {0}")]
    Validation(String),

    /// The actor has no stored position.
    #[error("No position recorded for actor: {0}")]
    NoPosition(ActorId),

    /// The identity provider does not know the actor.
    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),
}

impl LocationError {
    /// Returns the failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) | Self::Database(_) => ErrorKind::Storage,
            Self::OutOfRange { .. } | Self::Validation(_) => ErrorKind::Validation,
            Self::NoPosition(_) | Self::UnknownActor(_) => ErrorKind::NotFound,
        }
    }
}

/// Result type alias for location operations.
pub type LocationResult<T> = std::result::Result<T, LocationError>;
