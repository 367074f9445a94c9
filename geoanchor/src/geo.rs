//! Geodetic math on a spherical Earth.
//!
//! Pure functions for great-circle distance, initial bearing and the
//! north/east decomposition of short baselines. Everything here is stateless
//! and operates on degrees in, meters or degrees out.
//!
//! # Conventions
//!
//! - Bearings are measured clockwise from true north: 0 = North, 90 = East.
//! - Absolute angles are normalized into `[0, 360)`.
//! - Relative angles are normalized into `(-180, 180]`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters used by every spherical formula in this crate.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Below this resultant length two points are treated as coincident for
/// bearing purposes.
const COINCIDENT_EPSILON: f64 = 1e-15;

/// Great-circle distance between two points via the haversine formula.
///
/// Symmetric in its arguments and exactly `0.0` for coincident points.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if lat1 == lat2 && lon1 == lon2 {
        return 0.0;
    }

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi * 0.5).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda * 0.5).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Initial bearing from point 1 towards point 2, in `[0, 360)`.
///
/// Returns `0.0` when the points coincide. Callers must not rely on the
/// bearing when the distance is zero.
pub fn bearing_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    if y.abs() < COINCIDENT_EPSILON && x.abs() < COINCIDENT_EPSILON {
        return 0.0;
    }

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Signed meters from `lat1` to `lat2` along a meridian.
///
/// Positive when `lat2` lies north of `lat1`. No latitude correction is
/// applied, so this is only meaningful for short baselines.
pub fn north_offset_meters(lat1: f64, lat2: f64) -> f64 {
    (lat2 - lat1).to_radians() * EARTH_RADIUS_METERS
}

/// Signed meters from `lon1` to `lon2` along the parallel at `at_latitude`.
///
/// Positive when `lon2` lies east of `lon1`. The longitude delta is wrapped
/// into `(-180, 180]` so baselines across the antimeridian stay short.
pub fn east_offset_meters(lon1: f64, lon2: f64, at_latitude: f64) -> f64 {
    signed_angle_degrees(lon2 - lon1).to_radians() * EARTH_RADIUS_METERS * at_latitude.to_radians().cos()
}

/// Normalize any finite angle into `[0, 360)`.
#[inline]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Normalize any finite angle into `(-180, 180]`.
#[inline]
pub fn signed_angle_degrees(degrees: f64) -> f64 {
    let wrapped = normalize_degrees(degrees);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Shortest absolute angular separation between two headings, in `[0, 180]`.
#[inline]
pub fn angular_difference_degrees(a: f64, b: f64) -> f64 {
    signed_angle_degrees(b - a).abs()
}

/// A WGS-84 coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new coordinate pair.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and inside the WGS-84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        distance_meters(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Initial bearing towards `other` in `[0, 360)`.
    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        bearing_degrees(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// `(north, east)` offset in meters towards `other`, evaluated at this
    /// point's latitude.
    pub fn offset_to(&self, other: &GeoPoint) -> (f64, f64) {
        (
            north_offset_meters(self.latitude, other.latitude),
            east_offset_meters(self.longitude, other.longitude, self.latitude),
        )
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}
