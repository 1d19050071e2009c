//! Error types for friend graph operations.
//!
//! This module defines errors that can occur while sending, answering or
//! withdrawing friend requests and while querying or removing friendships.

use thiserror::Error;

use super::types::RequestId;
use crate::error::ErrorKind;
use crate::identity::ActorId;

/// Error type for friend graph operations.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error from `SQLite`.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid input such as a self-referencing pair.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The identity provider does not know the actor.
    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),

    /// Friend request not found.
    #[error("Friend request not found: {0}")]
    RequestNotFound(RequestId),

    /// No friendship exists between the two actors.
    #[error("No friendship between {0} and {1}")]
    FriendshipNotFound(ActorId, ActorId),

    /// The operation conflicts with the current graph state.
    #[error("Friend graph conflict: {0}")]
    Conflict(String),

    /// The acting actor is not allowed to perform the operation.
    #[error("Actor {actor} is not allowed to {action}")]
    Unauthorized {
        /// The actor that attempted the operation.
        actor: ActorId,
        /// The operation that was refused.
        action: &'static str,
    },
}

impl GraphError {
    /// Returns the failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) | Self::Database(_) => ErrorKind::Storage,
            Self::Validation(_) => ErrorKind::Validation,
            Self::UnknownActor(_) | Self::RequestNotFound(_) | Self::FriendshipNotFound(..) => {
                ErrorKind::NotFound
            }
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthorized { .. } => ErrorKind::Authorization,
        }
    }
}

/// Result type alias for friend graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;
