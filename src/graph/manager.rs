//! High-level friend graph API.
//!
//! [`FriendGraph`] combines [`GraphStorage`] with the identity directory and
//! enforces who may perform each transition. Every check that can fail runs
//! before storage is touched; the state change itself is a compare-and-set
//! inside storage, so concurrent callers racing on one request see exactly
//! one winner.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};

use super::error::{GraphError, GraphResult};
use super::storage::{cancelled, GraphStorage};
use super::types::{FriendRequest, Friendship, RequestCounts, RequestId, RequestStatus};
use crate::identity::{ActorId, IdentityDirectory};

/// Friend request state machine and symmetric friendship relation.
pub struct FriendGraph {
    storage: GraphStorage,
    identities: Arc<dyn IdentityDirectory>,
}

impl FriendGraph {
    /// Creates a friend graph over the given storage.
    #[must_use]
    pub fn new(storage: GraphStorage, identities: Arc<dyn IdentityDirectory>) -> Self {
        Self {
            storage,
            identities,
        }
    }

    /// Returns the underlying storage.
    #[must_use]
    pub const fn storage(&self) -> &GraphStorage {
        &self.storage
    }

    /// Returns the identity directory used for existence checks.
    #[must_use]
    pub fn identities(&self) -> &dyn IdentityDirectory {
        self.identities.as_ref()
    }

    // ==================== Request Lifecycle ====================

    /// Sends a friend request from `requester` to `requested`.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Validation`] if both are the same actor
    /// - [`GraphError::Conflict`] if either actor is unknown, they are
    ///   already friends, or a request exists between them in any direction
    pub fn send_request(
        &self,
        requester: &ActorId,
        requested: &ActorId,
    ) -> GraphResult<FriendRequest> {
        debug!("Sending friend request from {requester} to {requested}");

        if requester == requested {
            return Err(GraphError::Validation(
                "Cannot send a friend request to yourself".to_string(),
            ));
        }
        for id in [requester, requested] {
            if !self.identities.exists(id) {
                return Err(GraphError::Conflict(format!("Actor not found: {id}")));
            }
        }

        let request = self
            .storage
            .insert_request(requester, requested, Utc::now())?;
        info!("Friend request {} sent", request.id);
        Ok(request)
    }

    /// Accepts a pending request and creates the friendship.
    ///
    /// # Errors
    ///
    /// - [`GraphError::RequestNotFound`] if the request never existed
    /// - [`GraphError::Unauthorized`] if `actor` is not the requested actor
    /// - [`GraphError::Conflict`] if the request is no longer pending or was
    ///   cancelled
    pub fn accept(
        &self,
        request_id: RequestId,
        actor: &ActorId,
    ) -> GraphResult<(FriendRequest, Friendship)> {
        debug!("Accepting friend request {request_id} by {actor}");

        let request = self.require_request(request_id)?;
        Self::require_requested(&request, actor, "accept this friend request")?;
        Self::require_pending(&request)?;

        let (request, friendship) = self.storage.accept_request(request_id, Utc::now())?;
        info!(
            "Friend request {request_id} accepted, friendship {} created",
            friendship.id
        );
        Ok((request, friendship))
    }

    /// Rejects a pending request.
    ///
    /// # Errors
    ///
    /// - [`GraphError::RequestNotFound`] if the request never existed
    /// - [`GraphError::Unauthorized`] if `actor` is not the requested actor
    /// - [`GraphError::Conflict`] if the request is no longer pending or was
    ///   cancelled
    pub fn reject(&self, request_id: RequestId, actor: &ActorId) -> GraphResult<FriendRequest> {
        debug!("Rejecting friend request {request_id} by {actor}");

        let request = self.require_request(request_id)?;
        Self::require_requested(&request, actor, "reject this friend request")?;
        Self::require_pending(&request)?;

        let request = self.storage.reject_request(request_id, Utc::now())?;
        info!("Friend request {request_id} rejected");
        Ok(request)
    }

    /// Withdraws a pending request, deleting it. Returns the deleted request.
    ///
    /// # Errors
    ///
    /// - [`GraphError::RequestNotFound`] if the request does not exist
    /// - [`GraphError::Unauthorized`] if `actor` is not the requester
    /// - [`GraphError::Conflict`] if the request is no longer pending
    pub fn cancel(&self, request_id: RequestId, actor: &ActorId) -> GraphResult<FriendRequest> {
        debug!("Cancelling friend request {request_id} by {actor}");

        let request = self.require_request(request_id)?;
        if request.requester_id != *actor {
            return Err(GraphError::Unauthorized {
                actor: actor.clone(),
                action: "cancel this friend request",
            });
        }
        Self::require_pending(&request)?;

        let request = self.storage.delete_pending_request(request_id)?;
        info!("Friend request {request_id} cancelled");
        Ok(request)
    }

    /// Looks up a request by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn request(&self, request_id: RequestId) -> GraphResult<Option<FriendRequest>> {
        self.storage.get_request(request_id)
    }

    /// Looks up the request between two actors, in either direction.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] if `a == b`.
    pub fn request_between(&self, a: &ActorId, b: &ActorId) -> GraphResult<Option<FriendRequest>> {
        self.storage.find_request_between(a, b)
    }

    // ==================== Friendships ====================

    /// Removes the friendship between `a` and `b` on behalf of `acting`.
    ///
    /// Any request between the pair is reopened to `Pending`, which is
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Validation`] if `a == b`
    /// - [`GraphError::Unauthorized`] if `acting` is neither `a` nor `b`
    /// - [`GraphError::UnknownActor`] if either actor is unknown
    /// - [`GraphError::FriendshipNotFound`] if they are not friends
    pub fn remove_friendship(
        &self,
        a: &ActorId,
        b: &ActorId,
        acting: &ActorId,
    ) -> GraphResult<Option<FriendRequest>> {
        debug!("Removing friendship between {a} and {b} by {acting}");

        if a == b {
            return Err(GraphError::Validation(
                "Cannot remove a friendship with yourself".to_string(),
            ));
        }
        if acting != a && acting != b {
            return Err(GraphError::Unauthorized {
                actor: acting.clone(),
                action: "remove a friendship it is not part of",
            });
        }
        self.require_actor(a)?;
        self.require_actor(b)?;

        let reopened = self.storage.remove_friendship(a, b, Utc::now())?;
        if let Some(request) = &reopened {
            info!("Friend request {} reopened to pending", request.id);
        }
        info!("Friendship between {a} and {b} removed");
        Ok(reopened)
    }

    /// Returns true if `a` and `b` are friends. An actor is never its own
    /// friend.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn are_friends(&self, a: &ActorId, b: &ActorId) -> GraphResult<bool> {
        if a == b {
            return Ok(false);
        }
        self.storage.friendship_exists(a, b)
    }

    /// Lists the friends of `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownActor`] if the actor is unknown.
    pub fn friends_of(&self, actor: &ActorId) -> GraphResult<Vec<ActorId>> {
        self.require_actor(actor)?;
        self.storage.friends_of(actor)
    }

    /// Lists the friendships of `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownActor`] if the actor is unknown.
    pub fn friendships_of(&self, actor: &ActorId) -> GraphResult<Vec<Friendship>> {
        self.require_actor(actor)?;
        self.storage.friendships_of(actor)
    }

    /// Lists actors who are friends with both `a` and `b`, in `a`'s
    /// friend order.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Validation`] if `a == b`
    /// - [`GraphError::UnknownActor`] if either actor is unknown
    pub fn mutual_friends(&self, a: &ActorId, b: &ActorId) -> GraphResult<Vec<ActorId>> {
        if a == b {
            return Err(GraphError::Validation(
                "Cannot compute mutual friends with yourself".to_string(),
            ));
        }
        self.require_actor(a)?;
        self.require_actor(b)?;

        let of_b: HashSet<ActorId> = self.storage.friends_of(b)?.into_iter().collect();
        let mutual = self
            .storage
            .friends_of(a)?
            .into_iter()
            .filter(|friend| of_b.contains(friend))
            .collect();
        Ok(mutual)
    }

    /// Counts the friends of `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownActor`] if the actor is unknown.
    pub fn friend_count(&self, actor: &ActorId) -> GraphResult<u64> {
        self.require_actor(actor)?;
        self.storage.count_friends(actor)
    }

    /// Lists friendships of `actor` created at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownActor`] if the actor is unknown.
    pub fn recent_friendships(
        &self,
        actor: &ActorId,
        since: DateTime<Utc>,
    ) -> GraphResult<Vec<Friendship>> {
        self.require_actor(actor)?;
        self.storage.friendships_since(actor, since)
    }

    // ==================== Pending Requests ====================

    /// Lists pending requests addressed to `actor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn pending_received(&self, actor: &ActorId) -> GraphResult<Vec<FriendRequest>> {
        self.storage.requests_received(actor, RequestStatus::Pending)
    }

    /// Lists pending requests sent by `actor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn pending_sent(&self, actor: &ActorId) -> GraphResult<Vec<FriendRequest>> {
        self.storage.requests_sent(actor, RequestStatus::Pending)
    }

    /// Counts pending requests addressed to `actor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn pending_received_count(&self, actor: &ActorId) -> GraphResult<u64> {
        self.storage
            .count_requests_received(actor, RequestStatus::Pending)
    }

    /// Counts pending requests sent by `actor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn pending_sent_count(&self, actor: &ActorId) -> GraphResult<u64> {
        self.storage.count_requests_sent(actor, RequestStatus::Pending)
    }

    /// Both pending counters for `actor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn request_counts(&self, actor: &ActorId) -> GraphResult<RequestCounts> {
        Ok(RequestCounts {
            received: self.pending_received_count(actor)?,
            sent: self.pending_sent_count(actor)?,
        })
    }

    // ==================== Helpers ====================

    fn require_actor(&self, actor: &ActorId) -> GraphResult<()> {
        if self.identities.exists(actor) {
            Ok(())
        } else {
            Err(GraphError::UnknownActor(actor.clone()))
        }
    }

    fn require_request(&self, request_id: RequestId) -> GraphResult<FriendRequest> {
        match self.storage.get_request(request_id)? {
            Some(request) => Ok(request),
            None if self.storage.was_cancelled(request_id)? => Err(cancelled(request_id)),
            None => Err(GraphError::RequestNotFound(request_id)),
        }
    }

    fn require_requested(
        request: &FriendRequest,
        actor: &ActorId,
        action: &'static str,
    ) -> GraphResult<()> {
        if request.requested_id == *actor {
            Ok(())
        } else {
            Err(GraphError::Unauthorized {
                actor: actor.clone(),
                action,
            })
        }
    }

    fn require_pending(request: &FriendRequest) -> GraphResult<()> {
        if request.is_pending() {
            Ok(())
        } else {
            Err(GraphError::Conflict(format!(
                "Friend request {} is {}, not pending",
                request.id, request.status
            )))
        }
    }
}
