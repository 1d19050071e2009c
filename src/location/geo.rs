//! Coordinate validation and great-circle geometry.
//!
//! This module provides functions for:
//! - Range checks for latitude, longitude, altitude and accuracy
//! - Haversine distance between two points
//! - Axis-aligned bounding boxes for area queries

use serde::{Deserialize, Serialize};

use super::error::{LocationError, LocationResult};

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Smallest valid latitude in degrees.
pub const MIN_LATITUDE: f64 = -90.0;
/// Largest valid latitude in degrees.
pub const MAX_LATITUDE: f64 = 90.0;
/// Smallest valid longitude in degrees.
pub const MIN_LONGITUDE: f64 = -180.0;
/// Largest valid longitude in degrees.
pub const MAX_LONGITUDE: f64 = 180.0;
/// Lowest accepted altitude in meters.
pub const MIN_ALTITUDE: f64 = -1_000.0;
/// Highest accepted altitude in meters.
pub const MAX_ALTITUDE: f64 = 100_000.0;
/// Worst accepted horizontal accuracy in meters.
pub const MAX_ACCURACY: f64 = 10_000.0;

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> LocationResult<f64> {
    // NaN fails `contains`, infinities fall outside every bound
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(LocationError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Validates a latitude in degrees. Both bounds are inclusive.
///
/// # Errors
///
/// Returns [`LocationError::OutOfRange`] outside `[-90, 90]` or for NaN.
///
/// # Examples
///
/// ```
/// use safenet_core::location::validate_latitude;
///
/// assert!(validate_latitude(90.0).is_ok());
/// assert!(validate_latitude(91.0).is_err());
/// ```
pub fn validate_latitude(value: f64) -> LocationResult<f64> {
    check_range("latitude", value, MIN_LATITUDE, MAX_LATITUDE)
}

/// Validates a longitude in degrees. Both bounds are inclusive.
///
/// # Errors
///
/// Returns [`LocationError::OutOfRange`] outside `[-180, 180]` or for NaN.
pub fn validate_longitude(value: f64) -> LocationResult<f64> {
    check_range("longitude", value, MIN_LONGITUDE, MAX_LONGITUDE)
}

/// Validates an altitude in meters.
///
/// # Errors
///
/// Returns [`LocationError::OutOfRange`] outside `[-1000, 100000]` or for NaN.
pub fn validate_altitude(value: f64) -> LocationResult<f64> {
    check_range("altitude", value, MIN_ALTITUDE, MAX_ALTITUDE)
}

/// Validates a horizontal accuracy radius in meters.
///
/// # Errors
///
/// Returns [`LocationError::OutOfRange`] outside `[0, 10000]` or for NaN.
pub fn validate_accuracy(value: f64) -> LocationResult<f64> {
    check_range("accuracy", value, 0.0, MAX_ACCURACY)
}

/// Great-circle distance in meters between two points, by the haversine
/// formula on a sphere of radius [`EARTH_RADIUS_METERS`].
///
/// The result is symmetric in its arguments and zero for identical points.
///
/// # Examples
///
/// ```
/// use safenet_core::location::haversine_distance;
///
/// // Berlin to Munich
/// let d = haversine_distance(52.5200, 13.4050, 48.1351, 11.5820);
/// assert!((d - 504_000.0).abs() < 2_000.0);
/// ```
#[must_use]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let half_lat = (delta_lat / 2.0).sin();
    let half_lon = (delta_lon / 2.0).sin();
    let a = half_lon
        .mul_add(half_lon * (lat1_rad.cos() * lat2_rad.cos()), half_lat * half_lat)
        .clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Renders a coordinate pair with six decimals, e.g. `"52.520000, 13.405000"`.
#[must_use]
pub fn format_coordinates(latitude: f64, longitude: f64) -> String {
    format!("{latitude:.6}, {longitude:.6}")
}

/// Axis-aligned latitude/longitude box, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    /// Southern edge.
    pub min_latitude: f64,
    /// Northern edge.
    pub max_latitude: f64,
    /// Western edge.
    pub min_longitude: f64,
    /// Eastern edge.
    pub max_longitude: f64,
}

impl Bounds {
    /// Creates a validated bounding box.
    ///
    /// # Errors
    ///
    /// Returns an error if any edge is out of range or a minimum exceeds
    /// its maximum.
    pub fn new(
        min_latitude: f64,
        max_latitude: f64,
        min_longitude: f64,
        max_longitude: f64,
    ) -> LocationResult<Self> {
        validate_latitude(min_latitude)?;
        validate_latitude(max_latitude)?;
        validate_longitude(min_longitude)?;
        validate_longitude(max_longitude)?;

        if min_latitude > max_latitude || min_longitude > max_longitude {
            return Err(LocationError::Validation(format!(
                "Bounding box minimum exceeds maximum: \
                 lat [{min_latitude}, {max_latitude}], lon [{min_longitude}, {max_longitude}]"
            )));
        }

        Ok(Self {
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
        })
    }

    /// Returns true if the point lies inside the box.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }
}
