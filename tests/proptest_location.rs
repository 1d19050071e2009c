//! Property-based tests for location validation and distance.
//!
//! These tests verify:
//! - Coordinates inside the valid ranges are accepted, outside rejected
//! - Non-finite values are never accepted
//! - Haversine distance is symmetric, zero to self, and bounded
//! - An upsert keeps exactly one position per actor

use chrono::Utc;
use proptest::prelude::*;
use safenet_core::identity::ActorId;
use safenet_core::location::{
    haversine_distance, validate_accuracy, validate_altitude, validate_latitude,
    validate_longitude, LocationStorage, LocationUpdate, EARTH_RADIUS_METERS,
};
use safenet_core::ErrorKind;

/// Half the circumference, the largest possible great-circle distance.
const MAX_DISTANCE: f64 = std::f64::consts::PI * EARTH_RADIUS_METERS;

#[test]
fn non_finite_values_are_rejected() {
    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        assert!(validate_latitude(value).is_err());
        assert!(validate_longitude(value).is_err());
        assert!(validate_altitude(value).is_err());
        assert!(validate_accuracy(value).is_err());
    }
}

#[test]
fn antipodes_are_half_circumference_apart() {
    let d = haversine_distance(0.0, 0.0, 0.0, 180.0);
    assert!((d - MAX_DISTANCE).abs() < 1.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn valid_coordinates_are_accepted(
        lat in -90.0_f64..=90.0,
        lon in -180.0_f64..=180.0,
        alt in -1_000.0_f64..=100_000.0,
        acc in 0.0_f64..=10_000.0,
    ) {
        let update = LocationUpdate::new(lat, lon).with_altitude(alt).with_accuracy(acc);
        prop_assert!(update.validate().is_ok());
    }

    #[test]
    fn out_of_range_latitude_is_rejected(excess in 1e-6_f64..1e6, negative in any::<bool>()) {
        let lat = if negative { -90.0 - excess } else { 90.0 + excess };
        let err = validate_latitude(lat).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn out_of_range_longitude_is_rejected(excess in 1e-6_f64..1e6, negative in any::<bool>()) {
        let lon = if negative { -180.0 - excess } else { 180.0 + excess };
        prop_assert!(validate_longitude(lon).is_err());
    }

    #[test]
    fn distance_is_symmetric(
        lat1 in -90.0_f64..=90.0,
        lon1 in -180.0_f64..=180.0,
        lat2 in -90.0_f64..=90.0,
        lon2 in -180.0_f64..=180.0,
    ) {
        let forward = haversine_distance(lat1, lon1, lat2, lon2);
        let backward = haversine_distance(lat2, lon2, lat1, lon1);
        prop_assert!((forward - backward).abs() < 1e-6);
    }

    #[test]
    fn distance_to_self_is_zero(lat in -90.0_f64..=90.0, lon in -180.0_f64..=180.0) {
        prop_assert!(haversine_distance(lat, lon, lat, lon).abs() < 1e-6);
    }

    #[test]
    fn distance_is_bounded(
        lat1 in -90.0_f64..=90.0,
        lon1 in -180.0_f64..=180.0,
        lat2 in -90.0_f64..=90.0,
        lon2 in -180.0_f64..=180.0,
    ) {
        let d = haversine_distance(lat1, lon1, lat2, lon2);
        prop_assert!(d >= 0.0);
        prop_assert!(d <= MAX_DISTANCE + 1.0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn upserts_keep_one_position_per_actor(
        points in prop::collection::vec((-90.0_f64..=90.0, -180.0_f64..=180.0), 1..10),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocationStorage::new(&dir.path().join("locations.db")).unwrap();
        let actor = ActorId::from("alice");

        let mut first_id = None;
        for (lat, lon) in &points {
            let outcome = storage
                .upsert(&actor, &LocationUpdate::new(*lat, *lon), Utc::now())
                .unwrap();
            let id = *first_id.get_or_insert(outcome.position.id);
            prop_assert_eq!(outcome.position.id, id);
        }

        let (lat, lon) = points[points.len() - 1];
        let latest = storage.latest_for(&actor).unwrap().unwrap();
        prop_assert!((latest.latitude - lat).abs() < 1e-9);
        prop_assert!((latest.longitude - lon).abs() < 1e-9);
        prop_assert_eq!(storage.updated_since(Utc::now() - chrono::Duration::hours(1)).unwrap().len(), 1);
    }
}
