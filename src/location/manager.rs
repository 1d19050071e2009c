//! High-level position API.
//!
//! [`GeoLocation`] validates input before it reaches [`LocationStorage`] and
//! exposes the queries the proximity notifier and hosts need.

use chrono::{DateTime, Utc};
use log::{debug, info};

use super::error::LocationResult;
use super::geo::Bounds;
use super::storage::LocationStorage;
use super::types::{GeoPosition, LocationUpdate, UpsertOutcome, VisibilityChange};
use crate::identity::ActorId;

/// Validated access to actor positions.
pub struct GeoLocation {
    storage: LocationStorage,
}

impl GeoLocation {
    /// Creates the service over the given storage.
    #[must_use]
    pub const fn new(storage: LocationStorage) -> Self {
        Self { storage }
    }

    /// Returns the underlying storage.
    #[must_use]
    pub const fn storage(&self) -> &LocationStorage {
        &self.storage
    }

    /// Records a new position for `actor`, updating the existing record in
    /// place when there is one.
    ///
    /// Visibility changes only when `update.visible_to_friends` is set; a
    /// first position defaults to visible.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::OutOfRange`](super::LocationError::OutOfRange) if a coordinate is invalid.
    /// Nothing is written in that case.
    pub fn upsert(&self, actor: &ActorId, update: &LocationUpdate) -> LocationResult<UpsertOutcome> {
        debug!("Updating position for {actor}");
        update.validate()?;

        let outcome = self.storage.upsert(actor, update, Utc::now())?;
        if !outcome.applied {
            debug!("Dropped update for {actor}, a newer position is stored");
            return Ok(outcome);
        }
        info!(
            "Position for {actor} {} (visible: {})",
            if outcome.created() { "created" } else { "updated" },
            outcome.position.visible_to_friends
        );
        Ok(outcome)
    }

    /// Changes whether friends can see `actor`'s position.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::NoPosition`](super::LocationError::NoPosition) if the actor has no position.
    pub fn set_visibility(&self, actor: &ActorId, visible: bool) -> LocationResult<VisibilityChange> {
        debug!("Setting position visibility for {actor} to {visible}");

        let change = self.storage.set_visibility(actor, visible, Utc::now())?;
        info!("Position visibility for {actor} set to {visible}");
        Ok(change)
    }

    /// The actor's position, visible or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn latest_for(&self, actor: &ActorId) -> LocationResult<Option<GeoPosition>> {
        self.storage.latest_for(actor)
    }

    /// The actor's position, if it is visible to friends.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn latest_visible_for(&self, actor: &ActorId) -> LocationResult<Option<GeoPosition>> {
        self.storage.latest_visible_for(actor)
    }

    /// Visible positions of the given actors.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn latest_visible_for_many(&self, actors: &[ActorId]) -> LocationResult<Vec<GeoPosition>> {
        self.storage.latest_visible_for_many(actors)
    }

    /// Visible positions inside a bounding box.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn within_bounds(&self, bounds: &Bounds) -> LocationResult<Vec<GeoPosition>> {
        self.storage.within_bounds(bounds)
    }

    /// Positions updated at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn updated_since(&self, since: DateTime<Utc>) -> LocationResult<Vec<GeoPosition>> {
        self.storage.updated_since(since)
    }

    /// Positions last updated before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn not_updated_since(&self, cutoff: DateTime<Utc>) -> LocationResult<Vec<GeoPosition>> {
        self.storage.not_updated_since(cutoff)
    }

    /// Returns true if the actor reported a position at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    pub fn has_recent_position(&self, actor: &ActorId, since: DateTime<Utc>) -> LocationResult<bool> {
        self.storage.has_position_since(actor, since)
    }

    /// Great-circle distance between two positions, in meters.
    #[must_use]
    pub fn distance(a: &GeoPosition, b: &GeoPosition) -> f64 {
        a.distance_to(b)
    }

    /// Removes positions last updated before `cutoff`. Safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> LocationResult<usize> {
        let removed = self.storage.delete_older_than(cutoff)?;
        if removed > 0 {
            info!("Purged {removed} positions older than {cutoff}");
        }
        Ok(removed)
    }

    /// Removes the actor's position. Safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    pub fn purge_for(&self, actor: &ActorId) -> LocationResult<usize> {
        let removed = self.storage.delete_for(actor)?;
        debug!("Removed {removed} positions for {actor}");
        Ok(removed)
    }
}
