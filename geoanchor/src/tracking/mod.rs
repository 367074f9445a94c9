//! Smoothing of raw position and orientation samples.
//!
//! Each tracker keeps a short bounded history of raw samples and re-derives a
//! smoothed estimate on every accepted sample. Trackers are plain owned state:
//! they take samples as arguments and never reach into any global context.
//!
//! ```text
//! PositionSample ─────► PositionTracker ─────► SmoothedPosition
//!                       (accuracy + recency weighted mean)
//!
//! OrientationSample ──► OrientationTracker ──► SmoothedOrientation
//!                       (circular mean heading, linear pitch/roll)
//! ```

mod history;
mod orientation;
mod position;

pub use history::{recency_weight, SampleHistory, DEFAULT_HISTORY_CAPACITY, DEFAULT_RECENCY_FACTOR};
pub use orientation::{
    circular_mean_degrees, OrientationTracker, OrientationTrackerConfig, SmoothedOrientation,
    DEFAULT_MIN_ANGULAR_DELTA_DEGREES,
};
pub use position::{
    PositionTracker, PositionTrackerConfig, SmoothedPosition, DEFAULT_MAX_ACCURACY_METERS,
};

/// What happened to a sample handed to a tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome<T> {
    /// The sample was folded into history and produced a new estimate.
    Updated(T),
    /// The sample was too close to the last accepted one and was ignored.
    Throttled,
    /// Tracking has been stopped; the sample was ignored.
    Stopped,
}

impl<T> IngestOutcome<T> {
    /// The new estimate, if one was produced.
    pub fn updated(&self) -> Option<&T> {
        match self {
            IngestOutcome::Updated(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, IngestOutcome::Updated(_))
    }
}
