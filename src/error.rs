//! Crate-level error aggregation.
//!
//! Every component owns its own `thiserror` enum. [`CoreError`] collects
//! them for callers that drive several components at once (the proximity
//! notifier and the [`crate::SafeNetCore`] facade), and [`ErrorKind`]
//! classifies any of them into the failure classes callers branch on.

use thiserror::Error;

use crate::config::ConfigError;
use crate::graph::GraphError;
use crate::location::LocationError;
use crate::notify::NotifyError;

/// Failure class of an error, independent of the component that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: self-reference, out-of-range coordinate, blank field.
    Validation,
    /// The operation conflicts with current state (duplicate, not pending).
    Conflict,
    /// The acting actor may not perform the operation.
    Authorization,
    /// The referenced request, friendship, position or actor does not exist.
    NotFound,
    /// A notification could not be handed to the transport.
    Delivery,
    /// Database or lock failure.
    Storage,
    /// Invalid or unreadable configuration.
    Configuration,
}

impl ErrorKind {
    /// Converts to a stable string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::Delivery => "delivery",
            Self::Storage => "storage",
            Self::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type spanning all SafeNet components.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Friend graph operation failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Location operation failed.
    #[error(transparent)]
    Location(#[from] LocationError),

    /// Notification could not be built or delivered.
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The data directory could not be prepared.
    #[error("Failed to prepare data directory {path}: {reason}")]
    DataDir {
        /// The directory that could not be created.
        path: String,
        /// The underlying I/O failure.
        reason: String,
    },

    /// A storage task on the blocking pool panicked or was cancelled.
    #[error("Storage task failed: {0}")]
    Worker(String),
}

impl CoreError {
    /// Returns the failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Graph(e) => e.kind(),
            Self::Location(e) => e.kind(),
            Self::Notify(e) => e.kind(),
            Self::Config(e) => e.kind(),
            Self::DataDir { .. } | Self::Worker(_) => ErrorKind::Storage,
        }
    }
}

/// Result type alias for cross-component operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
