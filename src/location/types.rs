//! Location data types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::LocationResult;
use super::geo::{
    format_coordinates, haversine_distance, validate_accuracy, validate_altitude,
    validate_latitude, validate_longitude,
};
use crate::identity::ActorId;

/// Row identifier of a stored position.
pub type PositionId = i64;

/// A position updated less than this many seconds ago is recent.
pub const RECENT_THRESHOLD_SECS: i64 = 300;

/// A position not updated for more than this many seconds is stale.
pub const STALE_THRESHOLD_SECS: i64 = 1_800;

/// Input for recording an actor's position.
///
/// `visible_to_friends` is optional: when absent, an existing position keeps
/// its current visibility and a new one starts visible.
///
/// # Example
///
/// ```
/// use safenet_core::location::LocationUpdate;
///
/// let update = LocationUpdate::new(52.52, 13.405)
///     .with_accuracy(12.0)
///     .with_visibility(false);
/// assert!(update.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters.
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters.
    pub accuracy: Option<f64>,
    /// Visibility to friends, if it should change.
    pub visible_to_friends: Option<bool>,
}

impl LocationUpdate {
    /// Creates an update with coordinates only.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            visible_to_friends: None,
        }
    }

    /// Sets the altitude.
    #[must_use]
    pub const fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Sets the accuracy.
    #[must_use]
    pub const fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Sets the visibility explicitly.
    #[must_use]
    pub const fn with_visibility(mut self, visible: bool) -> Self {
        self.visible_to_friends = Some(visible);
        self
    }

    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`super::LocationError::OutOfRange`] for the first offending
    /// field.
    pub fn validate(&self) -> LocationResult<()> {
        validate_latitude(self.latitude)?;
        validate_longitude(self.longitude)?;
        if let Some(altitude) = self.altitude {
            validate_altitude(altitude)?;
        }
        if let Some(accuracy) = self.accuracy {
            validate_accuracy(accuracy)?;
        }
        Ok(())
    }
}

/// The single authoritative position of an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPosition {
    /// Storage identifier, stable across updates.
    pub id: PositionId,
    /// The actor this position belongs to.
    pub actor_id: ActorId,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters.
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters.
    pub accuracy: Option<f64>,
    /// Whether friends may see this position.
    pub visible_to_friends: bool,
    /// When the actor's first position was recorded.
    pub created_at: DateTime<Utc>,
    /// When coordinates or visibility last changed.
    pub updated_at: DateTime<Utc>,
}

impl GeoPosition {
    /// Returns true if the position was updated within the last five minutes.
    #[must_use]
    pub fn is_recent(&self) -> bool {
        self.is_recent_at(Utc::now())
    }

    /// Recency relative to a given instant.
    #[must_use]
    pub fn is_recent_at(&self, now: DateTime<Utc>) -> bool {
        now - self.updated_at < Duration::seconds(RECENT_THRESHOLD_SECS)
    }

    /// Returns true if the position has not been updated for thirty minutes.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    /// Staleness relative to a given instant.
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now - self.updated_at > Duration::seconds(STALE_THRESHOLD_SECS)
    }

    /// Great-circle distance to another position, in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Coordinates rendered as `"lat, lon"` with six decimals.
    #[must_use]
    pub fn formatted(&self) -> String {
        format_coordinates(self.latitude, self.longitude)
    }
}

/// Result of [`super::GeoLocation::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// The stored position after the update.
    pub position: GeoPosition,
    /// Visibility before the update, `None` if the position is new.
    pub previous_visibility: Option<bool>,
    /// False if a newer position was already stored and this update was
    /// dropped. `position` is then the stored, newer one.
    pub applied: bool,
}

impl UpsertOutcome {
    /// Returns true if this update created the actor's first position.
    #[must_use]
    pub const fn created(&self) -> bool {
        self.previous_visibility.is_none()
    }

    /// Returns true if visibility differs from before the update.
    #[must_use]
    pub fn visibility_changed(&self) -> bool {
        self.applied
            && self
                .previous_visibility
            .is_some_and(|previous| previous != self.position.visible_to_friends)
    }

    /// Returns true if friends can see the position now but could not
    /// before (including a brand-new visible position).
    #[must_use]
    pub fn became_visible(&self) -> bool {
        self.applied
            && self.position.visible_to_friends
            && self.previous_visibility != Some(true)
    }
}

/// Result of [`super::GeoLocation::set_visibility`].
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityChange {
    /// The stored position after the change.
    pub position: GeoPosition,
    /// Visibility before the change.
    pub previous: bool,
}

impl VisibilityChange {
    /// The new visibility.
    #[must_use]
    pub const fn visible(&self) -> bool {
        self.position.visible_to_friends
    }

    /// Returns true if the visibility actually flipped.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.previous != self.position.visible_to_friends
    }
}
