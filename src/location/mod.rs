//! Location module for SafeNet.
//!
//! Keeps the single latest position of each actor together with a
//! visibility flag that decides whether friends may see it.
//!
//! - Strict range validation (no silent clamping of bad coordinates)
//! - In-place updates: one row per actor, stable `id` and `created_at`
//! - Recency (updated within 5 minutes) and staleness (older than 30 minutes)
//! - Haversine distance on a 6,371 km sphere
//!
//! # Example Usage
//!
//! ```
//! use safenet_core::identity::ActorId;
//! use safenet_core::location::{GeoLocation, LocationStorage, LocationUpdate};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let storage = LocationStorage::new(&dir.path().join("locations.db")).unwrap();
//! let geo = GeoLocation::new(storage);
//! let alice = ActorId::from("alice");
//!
//! let outcome = geo
//!     .upsert(&alice, &LocationUpdate::new(52.52, 13.405).with_accuracy(8.0))
//!     .unwrap();
//! assert!(outcome.created());
//! assert!(outcome.position.is_recent());
//! assert_eq!(outcome.position.formatted(), "52.520000, 13.405000");
//! ```

pub mod error;
pub mod geo;
pub mod manager;
pub mod storage;
pub mod types;

pub use error::{LocationError, LocationResult};
pub use geo::{
    format_coordinates, haversine_distance, validate_accuracy, validate_altitude,
    validate_latitude, validate_longitude, Bounds, EARTH_RADIUS_METERS,
};
pub use manager::GeoLocation;
pub use storage::LocationStorage;
pub use types::{
    GeoPosition, LocationUpdate, PositionId, UpsertOutcome, VisibilityChange,
    RECENT_THRESHOLD_SECS, STALE_THRESHOLD_SECS,
};
