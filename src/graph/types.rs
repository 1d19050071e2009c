//! Core types for the friend graph.
//!
//! A friendship is an undirected edge. Both requests and friendships are
//! keyed by [`ActorPair`], the canonical `(low, high)` ordering of the two
//! actors, so a single lookup answers "is there anything between a and b"
//! regardless of who asked first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{GraphError, GraphResult};
use crate::identity::ActorId;

/// Row identifier of a friend request.
pub type RequestId = i64;

/// Row identifier of a friendship.
pub type FriendshipId = i64;

/// Lifecycle state of a friend request.
///
/// ```text
///   Pending ──accept──▶ Accepted
///      │                   │
///      └──reject──▶ Rejected
///      │
///      └──cancel──▶ (deleted)
///
///   Accepted ──reopen (friendship removed)──▶ Pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Sent and awaiting an answer.
    Pending,
    /// Accepted by the requested actor; a friendship exists.
    Accepted,
    /// Rejected by the requested actor.
    Rejected,
}

impl RequestStatus {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns true if the request still awaits an answer.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns whether moving from `self` to `next` is a legal transition.
    ///
    /// Forward transitions only leave `Pending`. The single way back is the
    /// reopen performed when a friendship is removed.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted | Self::Rejected)
                | (Self::Accepted | Self::Rejected, Self::Pending)
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical, order-independent key for two distinct actors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorPair {
    low: ActorId,
    high: ActorId,
}

impl ActorPair {
    /// Creates the canonical pair for `a` and `b`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] if `a` and `b` are the same actor.
    pub fn new(a: &ActorId, b: &ActorId) -> GraphResult<Self> {
        match a.cmp(b) {
            std::cmp::Ordering::Less => Ok(Self {
                low: a.clone(),
                high: b.clone(),
            }),
            std::cmp::Ordering::Greater => Ok(Self {
                low: b.clone(),
                high: a.clone(),
            }),
            std::cmp::Ordering::Equal => Err(GraphError::Validation(format!(
                "An actor cannot be paired with itself: {a}"
            ))),
        }
    }

    /// The smaller identifier.
    #[must_use]
    pub const fn low(&self) -> &ActorId {
        &self.low
    }

    /// The larger identifier.
    #[must_use]
    pub const fn high(&self) -> &ActorId {
        &self.high
    }

    /// Returns true if `actor` is one of the two members.
    #[must_use]
    pub fn contains(&self, actor: &ActorId) -> bool {
        self.low == *actor || self.high == *actor
    }

    /// Returns the member that is not `actor`.
    #[must_use]
    pub fn other(&self, actor: &ActorId) -> Option<&ActorId> {
        if self.low == *actor {
            Some(&self.high)
        } else if self.high == *actor {
            Some(&self.low)
        } else {
            None
        }
    }
}

/// A directed friend request between two actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    /// Storage identifier.
    pub id: RequestId,
    /// Actor who sent the request.
    pub requester_id: ActorId,
    /// Actor who received the request.
    pub requested_id: ActorId,
    /// Current lifecycle state.
    pub status: RequestStatus,
    /// When the request was sent.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl FriendRequest {
    /// Returns true if the request still awaits an answer.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    /// Returns true if `actor` sent or received this request.
    #[must_use]
    pub fn involves(&self, actor: &ActorId) -> bool {
        self.requester_id == *actor || self.requested_id == *actor
    }
}

/// An undirected friendship, stored with `user_a_id < user_b_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    /// Storage identifier.
    pub id: FriendshipId,
    /// The smaller actor identifier.
    pub user_a_id: ActorId,
    /// The larger actor identifier.
    pub user_b_id: ActorId,
    /// When the friendship was created.
    pub created_at: DateTime<Utc>,
}

impl Friendship {
    /// Returns true if `actor` is one side of the friendship.
    #[must_use]
    pub fn involves(&self, actor: &ActorId) -> bool {
        self.user_a_id == *actor || self.user_b_id == *actor
    }

    /// Returns the friend of `actor` in this friendship.
    #[must_use]
    pub fn other(&self, actor: &ActorId) -> Option<&ActorId> {
        if self.user_a_id == *actor {
            Some(&self.user_b_id)
        } else if self.user_b_id == *actor {
            Some(&self.user_a_id)
        } else {
            None
        }
    }
}

/// Pending request counters for one actor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCounts {
    /// Pending requests addressed to the actor.
    pub received: u64,
    /// Pending requests sent by the actor.
    pub sent: u64,
}

impl RequestCounts {
    /// Total pending requests in either direction.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.received + self.sent
    }
}
