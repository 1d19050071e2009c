//! Orchestration of graph and location changes into notifications.
//!
//! Each operation first runs the state change on [`FriendGraph`] or
//! [`GeoLocation`]. Only after it has committed does the notifier compute
//! the audience from the friend graph and hand the notifications to the
//! fan-out. Delivery problems are logged and never turn a committed change
//! into an error.
//!
//! Graph and location storage is synchronous SQLite behind a mutex. The
//! async operations run those calls on tokio's blocking pool so a contended
//! database never stalls a runtime worker.

use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::{json, Map, Value};

use crate::config::DEFAULT_EMERGENCY_MESSAGE;
use crate::error::{CoreError, CoreResult};
use crate::graph::{FriendGraph, FriendRequest, Friendship, RequestId};
use crate::identity::ActorId;
use crate::location::{
    GeoLocation, GeoPosition, LocationError, LocationUpdate, UpsertOutcome, VisibilityChange,
};
use crate::notify::{FanoutReport, NotificationFanout, NotificationType};

/// Turns friend graph transitions and location changes into notifications.
pub struct ProximityNotifier {
    graph: Arc<FriendGraph>,
    locations: Arc<GeoLocation>,
    fanout: Arc<NotificationFanout>,
    emergency_message: String,
}

impl ProximityNotifier {
    /// Creates a notifier over the given components.
    #[must_use]
    pub fn new(
        graph: Arc<FriendGraph>,
        locations: Arc<GeoLocation>,
        fanout: Arc<NotificationFanout>,
    ) -> Self {
        Self {
            graph,
            locations,
            fanout,
            emergency_message: DEFAULT_EMERGENCY_MESSAGE.to_string(),
        }
    }

    /// Sets the message used when an emergency share carries none.
    #[must_use]
    pub fn with_emergency_message(mut self, message: impl Into<String>) -> Self {
        self.emergency_message = message.into();
        self
    }

    /// The friend graph this notifier drives.
    #[must_use]
    pub fn graph(&self) -> &FriendGraph {
        &self.graph
    }

    /// The location service this notifier drives.
    #[must_use]
    pub fn locations(&self) -> &GeoLocation {
        &self.locations
    }

    /// The fan-out notifications go through.
    #[must_use]
    pub fn fanout(&self) -> &NotificationFanout {
        &self.fanout
    }

    // ==================== Friend Requests ====================

    /// Sends a friend request and notifies the requested actor.
    ///
    /// # Errors
    ///
    /// Returns the [`FriendGraph::send_request`] error. Delivery failures
    /// are not errors.
    pub async fn send_friend_request(
        &self,
        requester: &ActorId,
        requested: &ActorId,
    ) -> CoreResult<FriendRequest> {
        let graph = Arc::clone(&self.graph);
        let (from, to) = (requester.clone(), requested.clone());
        let request = run_blocking(move || Ok(graph.send_request(&from, &to)?)).await?;

        self.notify_one(
            NotificationType::FriendRequestReceived,
            requester,
            requested,
            request_data(&request, None),
        )
        .await;
        Ok(request)
    }

    /// Accepts a friend request and notifies the requester.
    ///
    /// # Errors
    ///
    /// Returns the [`FriendGraph::accept`] error.
    pub async fn accept_friend_request(
        &self,
        request_id: RequestId,
        actor: &ActorId,
    ) -> CoreResult<(FriendRequest, Friendship)> {
        let graph = Arc::clone(&self.graph);
        let acting = actor.clone();
        let (request, friendship) =
            run_blocking(move || Ok(graph.accept(request_id, &acting)?)).await?;

        self.notify_one(
            NotificationType::FriendRequestAccepted,
            actor,
            &request.requester_id,
            request_data(&request, Some(&friendship)),
        )
        .await;
        Ok((request, friendship))
    }

    /// Rejects a friend request and notifies the requester.
    ///
    /// # Errors
    ///
    /// Returns the [`FriendGraph::reject`] error.
    pub async fn reject_friend_request(
        &self,
        request_id: RequestId,
        actor: &ActorId,
    ) -> CoreResult<FriendRequest> {
        let graph = Arc::clone(&self.graph);
        let acting = actor.clone();
        let request = run_blocking(move || Ok(graph.reject(request_id, &acting)?)).await?;

        self.notify_one(
            NotificationType::FriendRequestRejected,
            actor,
            &request.requester_id,
            request_data(&request, None),
        )
        .await;
        Ok(request)
    }

    /// Withdraws a friend request and notifies the requested actor.
    ///
    /// # Errors
    ///
    /// Returns the [`FriendGraph::cancel`] error.
    pub async fn cancel_friend_request(
        &self,
        request_id: RequestId,
        actor: &ActorId,
    ) -> CoreResult<FriendRequest> {
        let graph = Arc::clone(&self.graph);
        let acting = actor.clone();
        let request = run_blocking(move || Ok(graph.cancel(request_id, &acting)?)).await?;

        self.notify_one(
            NotificationType::FriendRequestCancelled,
            actor,
            &request.requested_id,
            request_data(&request, None),
        )
        .await;
        Ok(request)
    }

    /// Removes a friendship and notifies the other party.
    ///
    /// # Errors
    ///
    /// Returns the [`FriendGraph::remove_friendship`] error.
    pub async fn remove_friendship(
        &self,
        a: &ActorId,
        b: &ActorId,
        acting: &ActorId,
    ) -> CoreResult<Option<FriendRequest>> {
        let graph = Arc::clone(&self.graph);
        let ids = (a.clone(), b.clone(), acting.clone());
        let reopened =
            run_blocking(move || Ok(graph.remove_friendship(&ids.0, &ids.1, &ids.2)?)).await?;

        let other = if acting == a { b } else { a };
        let mut data = Map::new();
        data.insert("actorId".to_string(), json!(acting.as_str()));
        self.notify_one(NotificationType::FriendshipRemoved, acting, other, data)
            .await;
        Ok(reopened)
    }

    // ==================== Locations ====================

    /// Records a position and, if it is visible, tells every friend.
    ///
    /// # Errors
    ///
    /// - [`LocationError::UnknownActor`] if the actor is unknown
    /// - [`LocationError::OutOfRange`] if a coordinate is invalid
    pub async fn update_location(
        &self,
        actor: &ActorId,
        update: &LocationUpdate,
    ) -> CoreResult<UpsertOutcome> {
        self.require_actor(actor)?;
        let locations = Arc::clone(&self.locations);
        let (owner, update) = (actor.clone(), *update);
        let outcome = run_blocking(move || Ok(locations.upsert(&owner, &update)?)).await?;

        if !outcome.applied {
            debug!("Update for {actor} was older than the stored position, no friends notified");
        } else if outcome.position.visible_to_friends {
            let data = location_data(&outcome.position, true);
            self.notify_friends(actor, NotificationType::LocationUpdate, &data, false)
                .await;
        } else {
            debug!("Position for {actor} is hidden, no friends notified");
        }
        Ok(outcome)
    }

    /// Changes whether friends see the actor's position and tells every
    /// friend about it.
    ///
    /// # Errors
    ///
    /// - [`LocationError::UnknownActor`] if the actor is unknown
    /// - [`LocationError::NoPosition`] if the actor has no position
    pub async fn set_location_visibility(
        &self,
        actor: &ActorId,
        visible: bool,
    ) -> CoreResult<VisibilityChange> {
        self.require_actor(actor)?;
        let locations = Arc::clone(&self.locations);
        let owner = actor.clone();
        let change = run_blocking(move || Ok(locations.set_visibility(&owner, visible)?)).await?;

        let kind = if visible {
            NotificationType::LocationSharingEnabled
        } else {
            NotificationType::LocationSharingDisabled
        };
        let data = location_data(&change.position, visible);
        self.notify_friends(actor, kind, &data, false).await;
        Ok(change)
    }

    /// Sends the actor's position to every friend with the urgent profile,
    /// ignoring the visibility flag.
    ///
    /// Uses the configured emergency message when `message` is `None` or
    /// blank.
    ///
    /// # Errors
    ///
    /// - [`LocationError::UnknownActor`] if the actor is unknown
    /// - [`LocationError::NoPosition`] if the actor has no position
    pub async fn share_emergency_location(
        &self,
        actor: &ActorId,
        message: Option<&str>,
    ) -> CoreResult<FanoutReport> {
        self.require_actor(actor)?;
        let locations = Arc::clone(&self.locations);
        let owner = actor.clone();
        let position = run_blocking(move || Ok(locations.latest_for(&owner)?))
            .await?
            .ok_or_else(|| LocationError::NoPosition(actor.clone()))?;

        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.emergency_message.as_str());
        warn!("Emergency location shared by {actor}");

        let mut data = Map::new();
        data.insert("latitude".to_string(), json!(position.latitude));
        data.insert("longitude".to_string(), json!(position.longitude));
        data.insert("message".to_string(), json!(message));

        Ok(self
            .notify_friends(actor, NotificationType::EmergencyAlert, &data, true)
            .await)
    }

    /// Visible positions of the actor's friends.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor is unknown or a storage read fails.
    pub fn friends_locations(&self, actor: &ActorId) -> CoreResult<Vec<GeoPosition>> {
        let friends = self.graph.friends_of(actor)?;
        Ok(self.locations.latest_visible_for_many(&friends)?)
    }

    // ==================== Helpers ====================

    fn require_actor(&self, actor: &ActorId) -> Result<(), LocationError> {
        if self.graph.identities().exists(actor) {
            Ok(())
        } else {
            Err(LocationError::UnknownActor(actor.clone()))
        }
    }

    async fn notify_one(
        &self,
        kind: NotificationType,
        sender: &ActorId,
        receiver: &ActorId,
        data: Map<String, Value>,
    ) {
        let message = NotificationFanout::build(kind, sender, receiver, Some(data), false);
        if let Err(e) = self.fanout.deliver_to_actor(&message).await {
            debug!("{kind} for {receiver} not delivered: {e}");
        }
    }

    /// Snapshots the friend list once, then delivers to every friend
    /// concurrently.
    async fn notify_friends(
        &self,
        actor: &ActorId,
        kind: NotificationType,
        data: &Map<String, Value>,
        urgent: bool,
    ) -> FanoutReport {
        let graph = Arc::clone(&self.graph);
        let owner = actor.clone();
        let friends = match run_blocking(move || Ok(graph.friends_of(&owner)?)).await {
            Ok(friends) => friends,
            Err(e) => {
                warn!("Could not resolve friends of {actor} for {kind}: {e}");
                return FanoutReport::default();
            }
        };

        let messages: Vec<_> = friends
            .iter()
            .map(|friend| NotificationFanout::build(kind, actor, friend, Some(data.clone()), urgent))
            .collect();
        let report = self.fanout.deliver_all(&messages).await;

        if report.is_complete() {
            info!("{kind} from {actor} sent to {} friends", report.delivered.len());
        } else {
            warn!(
                "{kind} from {actor}: {} delivered, {} failed",
                report.delivered.len(),
                report.failed.len()
            );
        }
        report
    }
}

/// Runs a storage call on tokio's blocking pool.
async fn run_blocking<T, F>(op: F) -> CoreResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| CoreError::Worker(e.to_string()))?
}

fn request_data(request: &FriendRequest, friendship: Option<&Friendship>) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("requestId".to_string(), json!(request.id));
    data.insert("requesterId".to_string(), json!(request.requester_id.as_str()));
    data.insert("requestedId".to_string(), json!(request.requested_id.as_str()));
    if let Some(friendship) = friendship {
        data.insert("friendshipId".to_string(), json!(friendship.id));
    }
    data
}

fn location_data(position: &GeoPosition, visible: bool) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("actorId".to_string(), json!(position.actor_id.as_str()));
    data.insert("latitude".to_string(), json!(position.latitude));
    data.insert("longitude".to_string(), json!(position.longitude));
    data.insert("altitude".to_string(), json!(position.altitude));
    data.insert("accuracy".to_string(), json!(position.accuracy));
    data.insert("visible".to_string(), json!(visible));
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::GraphStorage;
    use crate::identity::{Actor, InMemoryDirectory};
    use crate::location::LocationStorage;
    use crate::notify::{InProcessChannel, NotificationPayload, Priority};
    use tokio::sync::mpsc::Receiver;

    struct Fixture {
        notifier: ProximityNotifier,
        channel: Arc<InProcessChannel>,
    }

    fn fixture(names: &[&str]) -> Fixture {
        let directory = InMemoryDirectory::with_actors(names.iter().map(|n| Actor::new(*n, *n)));
        let graph = FriendGraph::new(GraphStorage::in_memory().unwrap(), Arc::new(directory));
        let locations = GeoLocation::new(LocationStorage::in_memory().unwrap());
        let channel = Arc::new(InProcessChannel::new());
        let fanout = NotificationFanout::new(channel.clone());

        Fixture {
            notifier: ProximityNotifier::new(Arc::new(graph), Arc::new(locations), Arc::new(fanout)),
            channel,
        }
    }

    fn id(s: &str) -> ActorId {
        ActorId::from(s)
    }

    fn drain(rx: &mut Receiver<NotificationPayload>) -> Vec<NotificationPayload> {
        let mut out = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            out.push(payload);
        }
        out
    }

    async fn befriend(f: &Fixture, a: &str, b: &str) {
        let request = f.notifier.send_friend_request(&id(a), &id(b)).await.unwrap();
        f.notifier
            .accept_friend_request(request.id, &id(b))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn request_lifecycle_notifies_counterpart() {
        let f = fixture(&["alice", "bob"]);
        let mut alice_rx = f.channel.subscribe_actor("alice").await;
        let mut bob_rx = f.channel.subscribe_actor("bob").await;

        let request = f
            .notifier
            .send_friend_request(&id("alice"), &id("bob"))
            .await
            .unwrap();
        let received = drain(&mut bob_rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, NotificationType::FriendRequestReceived);
        assert_eq!(received[0].sender_id, "alice");
        assert_eq!(received[0].data["requestId"], json!(request.id));

        f.notifier
            .accept_friend_request(request.id, &id("bob"))
            .await
            .unwrap();
        let accepted = drain(&mut alice_rx);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].kind, NotificationType::FriendRequestAccepted);
        assert!(accepted[0].data.contains_key("friendshipId"));
    }

    #[tokio::test]
    async fn reject_and_cancel_notify() {
        let f = fixture(&["alice", "bob", "carol"]);
        let mut alice_rx = f.channel.subscribe_actor("alice").await;
        let mut carol_rx = f.channel.subscribe_actor("carol").await;

        let to_bob = f
            .notifier
            .send_friend_request(&id("alice"), &id("bob"))
            .await
            .unwrap();
        f.notifier
            .reject_friend_request(to_bob.id, &id("bob"))
            .await
            .unwrap();
        let kinds: Vec<_> = drain(&mut alice_rx).into_iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![NotificationType::FriendRequestRejected]);

        let to_carol = f
            .notifier
            .send_friend_request(&id("alice"), &id("carol"))
            .await
            .unwrap();
        f.notifier
            .cancel_friend_request(to_carol.id, &id("alice"))
            .await
            .unwrap();
        let kinds: Vec<_> = drain(&mut carol_rx).into_iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotificationType::FriendRequestReceived,
                NotificationType::FriendRequestCancelled
            ]
        );
    }

    #[tokio::test]
    async fn failed_transition_sends_nothing() {
        let f = fixture(&["alice", "bob"]);
        let mut bob_rx = f.channel.subscribe_actor("bob").await;

        let err = f
            .notifier
            .send_friend_request(&id("alice"), &id("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn removal_notifies_other_party() {
        let f = fixture(&["alice", "bob"]);
        befriend(&f, "alice", "bob").await;
        let mut bob_rx = f.channel.subscribe_actor("bob").await;

        let reopened = f
            .notifier
            .remove_friendship(&id("alice"), &id("bob"), &id("alice"))
            .await
            .unwrap();
        assert!(reopened.is_some());

        let kinds: Vec<_> = drain(&mut bob_rx).into_iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![NotificationType::FriendshipRemoved]);
    }

    #[tokio::test]
    async fn visible_update_reaches_friends_only() {
        let f = fixture(&["alice", "bob", "carol"]);
        befriend(&f, "alice", "bob").await;
        let mut bob_rx = f.channel.subscribe_actor("bob").await;
        let mut carol_rx = f.channel.subscribe_actor("carol").await;

        f.notifier
            .update_location(&id("alice"), &LocationUpdate::new(52.52, 13.405).with_accuracy(5.0))
            .await
            .unwrap();

        let received = drain(&mut bob_rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, NotificationType::LocationUpdate);
        assert_eq!(received[0].data["actorId"], "alice");
        assert_eq!(received[0].data["accuracy"], json!(5.0));
        assert_eq!(received[0].data["altitude"], Value::Null);
        assert_eq!(received[0].data["visible"], true);
        assert!(drain(&mut carol_rx).is_empty());
    }

    #[tokio::test]
    async fn hidden_update_notifies_nobody() {
        let f = fixture(&["alice", "bob"]);
        befriend(&f, "alice", "bob").await;
        let mut bob_rx = f.channel.subscribe_actor("bob").await;

        f.notifier
            .update_location(&id("alice"), &LocationUpdate::new(1.0, 1.0).with_visibility(false))
            .await
            .unwrap();

        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn visibility_toggle_notifies_friends() {
        let f = fixture(&["alice", "bob"]);
        befriend(&f, "alice", "bob").await;
        f.notifier
            .update_location(&id("alice"), &LocationUpdate::new(1.0, 1.0).with_visibility(false))
            .await
            .unwrap();
        let mut bob_rx = f.channel.subscribe_actor("bob").await;

        let change = f
            .notifier
            .set_location_visibility(&id("alice"), true)
            .await
            .unwrap();
        assert!(change.changed());

        let received = drain(&mut bob_rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, NotificationType::LocationSharingEnabled);
        assert_eq!(received[0].data["visible"], true);

        f.notifier
            .set_location_visibility(&id("alice"), false)
            .await
            .unwrap();
        let received = drain(&mut bob_rx);
        assert_eq!(received[0].kind, NotificationType::LocationSharingDisabled);
        assert_eq!(received[0].data["visible"], false);
    }

    #[tokio::test]
    async fn emergency_bypasses_visibility() {
        let f = fixture(&["alice", "bob", "carol"]);
        befriend(&f, "alice", "bob").await;
        befriend(&f, "carol", "alice").await;
        f.notifier
            .update_location(&id("alice"), &LocationUpdate::new(10.0, 20.0).with_visibility(false))
            .await
            .unwrap();
        let mut bob_rx = f.channel.subscribe_actor("bob").await;
        let mut carol_rx = f.channel.subscribe_actor("carol").await;

        let report = f
            .notifier
            .share_emergency_location(&id("alice"), Some("help"))
            .await
            .unwrap();
        assert_eq!(report.delivered.len(), 2);

        for rx in [&mut bob_rx, &mut carol_rx] {
            let received = drain(rx);
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].kind, NotificationType::EmergencyAlert);
            assert_eq!(received[0].priority, Priority::Urgent);
            assert!(received[0].push_notification);
            assert_eq!(received[0].data["message"], "help");
            assert_eq!(received[0].data["latitude"], json!(10.0));
        }
    }

    #[tokio::test]
    async fn emergency_uses_default_message() {
        let f = fixture(&["alice", "bob"]);
        befriend(&f, "alice", "bob").await;
        f.notifier
            .update_location(&id("alice"), &LocationUpdate::new(1.0, 1.0))
            .await
            .unwrap();
        let mut bob_rx = f.channel.subscribe_actor("bob").await;

        f.notifier
            .share_emergency_location(&id("alice"), None)
            .await
            .unwrap();

        assert_eq!(drain(&mut bob_rx)[0].data["message"], DEFAULT_EMERGENCY_MESSAGE);
    }

    #[tokio::test]
    async fn emergency_without_position_is_not_found() {
        let f = fixture(&["alice"]);
        let err = f
            .notifier
            .share_emergency_location(&id("alice"), Some("help"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn unknown_actor_cannot_update_location() {
        let f = fixture(&["alice"]);
        let err = f
            .notifier
            .update_location(&id("ghost"), &LocationUpdate::new(1.0, 1.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.notifier.locations().latest_for(&id("ghost")).unwrap().is_none());
    }

    #[tokio::test]
    async fn friends_locations_returns_visible_only() {
        let f = fixture(&["alice", "bob", "carol"]);
        befriend(&f, "alice", "bob").await;
        befriend(&f, "alice", "carol").await;
        f.notifier
            .update_location(&id("bob"), &LocationUpdate::new(1.0, 1.0))
            .await
            .unwrap();
        f.notifier
            .update_location(&id("carol"), &LocationUpdate::new(2.0, 2.0).with_visibility(false))
            .await
            .unwrap();

        let positions = f.notifier.friends_locations(&id("alice")).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].actor_id, id("bob"));
    }

    #[tokio::test]
    async fn panicking_storage_task_is_a_storage_error() {
        let err = run_blocking(|| -> CoreResult<()> { panic!("storage task panicked") })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Worker(_)));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn operations_run_on_a_single_worker_runtime() {
        let f = fixture(&["alice", "bob"]);
        let mut bob = f.channel.subscribe_actor("bob").await;

        befriend(&f, "alice", "bob").await;
        f.notifier
            .update_location(&id("alice"), &LocationUpdate::new(1.0, 2.0))
            .await
            .unwrap();

        let kinds: Vec<_> = drain(&mut bob).into_iter().map(|p| p.kind).collect();
        assert!(kinds.contains(&NotificationType::LocationUpdate));
    }
}
