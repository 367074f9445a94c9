//! Projection of anchored objects into the device's local frame.
//!
//! Turns an object's geographic location into an offset relative to where the
//! device stands and faces, ready for a renderer to place a mesh.
//!
//! # Frame
//!
//! ```text
//!             forward (+)
//!                 ▲
//!                 │   relative angle θ, clockwise from forward
//!                 │  ╱
//!                 │ ╱  forward = d·cos θ
//!                 │╱   right   = d·sin θ
//!   ──────────── user ──────────► right (+)
//! ```
//!
//! When the geometry cannot be trusted (no heading yet, no position, or a
//! non-finite intermediate) the object is placed a short fixed distance
//! straight ahead and the placement is flagged as degraded.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::AnchoredObject;
use crate::geo::{bearing_degrees, distance_meters, normalize_degrees, signed_angle_degrees};
use crate::tracking::SmoothedPosition;

/// Default cap on the distance at which meshes are placed.
pub const DEFAULT_MAX_RENDER_DISTANCE_METERS: f64 = 50.0;

/// Default distance of the directly-ahead fallback placement.
pub const DEFAULT_FALLBACK_DISTANCE_METERS: f64 = 2.0;

/// Configuration for the projector.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectorConfig {
    /// Objects farther than this are pulled in to this distance.
    pub max_render_distance_meters: f64,
    /// Distance ahead of the camera used for degraded placements.
    pub fallback_distance_meters: f64,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            max_render_distance_meters: DEFAULT_MAX_RENDER_DISTANCE_METERS,
            fallback_distance_meters: DEFAULT_FALLBACK_DISTANCE_METERS,
        }
    }
}

impl ProjectorConfig {
    pub fn with_max_render_distance(mut self, meters: f64) -> Self {
        self.max_render_distance_meters = meters;
        self
    }

    pub fn with_fallback_distance(mut self, meters: f64) -> Self {
        self.fallback_distance_meters = meters;
        self
    }
}

/// An object's placement relative to the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalOffset {
    /// Meters to the device's right (negative = left).
    pub right: f64,
    /// Meters ahead of the device (negative = behind).
    pub forward: f64,
    /// Local yaw of the object's model, in `[0, 360)`.
    pub rotation_degrees: f64,
    /// Great-circle distance before clamping.
    pub distance_meters: f64,
    /// Whether the placement was pulled in to the maximum render distance.
    pub clamped: bool,
}

impl LocalOffset {
    /// Translation for a right-handed, y-up scene where the camera looks down
    /// negative z.
    pub fn to_scene_translation(&self, height_meters: f64) -> [f64; 3] {
        [self.right, height_meters, -self.forward]
    }

    /// Planar length of the placed offset.
    pub fn placed_distance(&self) -> f64 {
        self.right.hypot(self.forward)
    }
}

/// Why a placement fell back to directly ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// No orientation estimate is available yet.
    MissingHeading,
    /// No position estimate is available yet.
    MissingPosition,
    /// An intermediate result was NaN or infinite.
    NonFiniteGeometry,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedReason::MissingHeading => write!(f, "no heading fix"),
            DegradedReason::MissingPosition => write!(f, "no position fix"),
            DegradedReason::NonFiniteGeometry => write!(f, "degenerate geometry"),
        }
    }
}

/// Result of projecting one object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "placement", rename_all = "snake_case")]
pub enum Placement {
    /// Geometry-derived placement.
    Anchored(LocalOffset),
    /// Directly-ahead fallback; rendering still proceeds.
    Degraded {
        offset: LocalOffset,
        reason: DegradedReason,
    },
}

impl Placement {
    /// The offset to render at, whichever kind of placement this is.
    pub fn offset(&self) -> &LocalOffset {
        match self {
            Placement::Anchored(offset) => offset,
            Placement::Degraded { offset, .. } => offset,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Placement::Degraded { .. })
    }

    pub fn degraded_reason(&self) -> Option<DegradedReason> {
        match self {
            Placement::Degraded { reason, .. } => Some(*reason),
            Placement::Anchored(_) => None,
        }
    }
}

/// Local yaw for an object placed facing `placement_heading` (clockwise from
/// north): `(360 - heading) mod 360`.
#[inline]
pub fn placement_rotation_degrees(placement_heading: f64) -> f64 {
    normalize_degrees(360.0 - placement_heading)
}

/// Projects anchored objects into the device's local frame.
#[derive(Debug, Clone, Default)]
pub struct ArAnchoringProjector {
    config: ProjectorConfig,
}

impl ArAnchoringProjector {
    /// Create a projector with default configuration.
    pub fn new() -> Self {
        Self::with_config(ProjectorConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: ProjectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProjectorConfig {
        &self.config
    }

    /// Project `object` relative to the user's position and heading.
    ///
    /// A missing heading or any non-finite intermediate yields the degraded
    /// directly-ahead placement.
    pub fn project(
        &self,
        object: &AnchoredObject,
        user_position: &SmoothedPosition,
        user_heading_degrees: Option<f64>,
    ) -> Placement {
        let distance = distance_meters(
            user_position.latitude,
            user_position.longitude,
            object.latitude,
            object.longitude,
        );

        let Some(heading) = user_heading_degrees else {
            return self.fallback(object, distance, DegradedReason::MissingHeading);
        };

        let bearing = bearing_degrees(
            user_position.latitude,
            user_position.longitude,
            object.latitude,
            object.longitude,
        );

        let clamped = distance > self.config.max_render_distance_meters;
        let placed = if clamped {
            self.config.max_render_distance_meters
        } else {
            distance
        };

        let relative = signed_angle_degrees(bearing - heading).to_radians();
        let forward = placed * relative.cos();
        let right = placed * relative.sin();
        let rotation = placement_rotation_degrees(object.heading_degrees);

        let offset = LocalOffset {
            right,
            forward,
            rotation_degrees: rotation,
            distance_meters: distance,
            clamped,
        };

        if [right, forward, rotation, distance, heading]
            .iter()
            .any(|v| !v.is_finite())
        {
            return self.fallback(object, distance, DegradedReason::NonFiniteGeometry);
        }

        Placement::Anchored(offset)
    }

    /// Directly-ahead placement used when no position estimate exists.
    pub fn project_without_position(&self, object: &AnchoredObject) -> Placement {
        self.fallback(object, f64::NAN, DegradedReason::MissingPosition)
    }

    fn fallback(&self, object: &AnchoredObject, distance: f64, reason: DegradedReason) -> Placement {
        let rotation = placement_rotation_degrees(object.heading_degrees);
        let offset = LocalOffset {
            right: 0.0,
            forward: self.config.fallback_distance_meters,
            rotation_degrees: if rotation.is_finite() { rotation } else { 0.0 },
            distance_meters: if distance.is_finite() { distance } else { 0.0 },
            clamped: false,
        };

        tracing::debug!(id = %object.id, reason = %reason, "Degraded placement, rendering directly ahead");

        Placement::Degraded { offset, reason }
    }
}
