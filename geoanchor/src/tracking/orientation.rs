//! Compass heading and tilt smoothing.
//!
//! Uses the same bounded history and recency weighting as the position
//! tracker. Heading is averaged on the unit circle so readings either side of
//! north (359° and 1°) average to north rather than south. Pitch and roll are
//! plain weighted means.
//!
//! Readings that moved less than `min_angular_delta_degrees` on every axis
//! since the last accepted reading are dropped before they reach history,
//! which bounds churn from high-rate compass streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::{recency_weight, SampleHistory, DEFAULT_HISTORY_CAPACITY, DEFAULT_RECENCY_FACTOR};
use super::IngestOutcome;
use crate::geo::{angular_difference_degrees, normalize_degrees};
use crate::sensor::{OrientationSample, SampleError};

/// Default minimum change (degrees) for a reading to be accepted.
pub const DEFAULT_MIN_ANGULAR_DELTA_DEGREES: f64 = 0.5;

/// Resultant vectors shorter than this fraction of the total weight are
/// treated as having no meaningful direction.
const DEGENERATE_RESULTANT: f64 = 1e-9;

/// Configuration for orientation smoothing.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationTrackerConfig {
    /// Number of raw readings retained.
    pub history_capacity: usize,
    /// Per-step decay of a reading's weight with age, in (0, 1).
    pub recency_factor: f64,
    /// Readings that changed less than this on every axis are ignored.
    pub min_angular_delta_degrees: f64,
}

impl Default for OrientationTrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            recency_factor: DEFAULT_RECENCY_FACTOR,
            min_angular_delta_degrees: DEFAULT_MIN_ANGULAR_DELTA_DEGREES,
        }
    }
}

impl OrientationTrackerConfig {
    /// Set the history capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the recency factor.
    pub fn with_recency_factor(mut self, factor: f64) -> Self {
        self.recency_factor = factor;
        self
    }

    /// Set the throttling threshold. Zero disables throttling.
    pub fn with_min_angular_delta(mut self, degrees: f64) -> Self {
        self.min_angular_delta_degrees = degrees;
        self
    }
}

/// The current best orientation estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedOrientation {
    /// Circular-mean heading in `[0, 360)`.
    pub heading_degrees: f64,
    pub pitch_degrees: f64,
    pub roll_degrees: f64,
    /// When this estimate was derived.
    pub computed_at: DateTime<Utc>,
}

/// Weighted circular mean of `(angle_degrees, weight)` pairs, in `[0, 360)`.
///
/// Returns `None` for an empty input, a non-positive total weight, or when the
/// weighted unit vectors cancel out (e.g. 90° and 270° with equal weight).
pub fn circular_mean_degrees<I>(angles: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;
    let mut total_weight = 0.0;

    for (angle, weight) in angles {
        let radians = angle.to_radians();
        sin_sum += weight * radians.sin();
        cos_sum += weight * radians.cos();
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return None;
    }
    if sin_sum.hypot(cos_sum) < DEGENERATE_RESULTANT * total_weight {
        return None;
    }

    let mean = normalize_degrees(sin_sum.atan2(cos_sum).to_degrees());
    mean.is_finite().then_some(mean)
}

/// Smooths a stream of compass/tilt readings.
#[derive(Debug)]
pub struct OrientationTracker {
    /// Accepted readings (newest first), headings normalized.
    history: SampleHistory<OrientationSample>,
    config: OrientationTrackerConfig,
    /// Last derived estimate, replaced whole on each update.
    current: Option<SmoothedOrientation>,
    stopped: bool,
}

impl Default for OrientationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OrientationTracker {
    /// Create a tracker with default configuration.
    pub fn new() -> Self {
        Self::with_config(OrientationTrackerConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: OrientationTrackerConfig) -> Self {
        Self {
            history: SampleHistory::new(config.history_capacity),
            config,
            current: None,
            stopped: false,
        }
    }

    /// Fold a reading into the estimate, stamping it with the current time.
    pub fn ingest(
        &mut self,
        sample: OrientationSample,
    ) -> Result<IngestOutcome<SmoothedOrientation>, SampleError> {
        self.ingest_at(sample, Utc::now())
    }

    /// Fold a reading into the estimate with an explicit ingestion time.
    pub fn ingest_at(
        &mut self,
        sample: OrientationSample,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome<SmoothedOrientation>, SampleError> {
        if self.stopped {
            return Ok(IngestOutcome::Stopped);
        }
        sample.validate()?;

        let sample = OrientationSample {
            heading_degrees: normalize_degrees(sample.heading_degrees),
            ..sample
        };

        if self.is_below_threshold(&sample) {
            return Ok(IngestOutcome::Throttled);
        }

        self.history.push(sample);

        let estimate = self.smooth(now);
        self.current = Some(estimate);
        tracing::debug!(
            heading = estimate.heading_degrees,
            pitch = estimate.pitch_degrees,
            roll = estimate.roll_degrees,
            samples = self.history.len(),
            "Orientation estimate updated"
        );
        Ok(IngestOutcome::Updated(estimate))
    }

    /// The last derived estimate, or `None` before the first reading.
    pub fn current(&self) -> Option<SmoothedOrientation> {
        self.current
    }

    /// Smoothed heading only, if any reading has been accepted.
    pub fn heading(&self) -> Option<f64> {
        self.current.map(|o| o.heading_degrees)
    }

    /// Stop accepting readings. The last estimate stays readable.
    ///
    /// Returns `true` if tracking was running.
    pub fn stop(&mut self) -> bool {
        let was_running = !self.stopped;
        self.stopped = true;
        was_running
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Drop history and estimate and resume accepting readings.
    pub fn reset(&mut self) {
        self.history.clear();
        self.current = None;
        self.stopped = false;
    }

    /// Number of accepted readings currently retained.
    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    pub fn config(&self) -> &OrientationTrackerConfig {
        &self.config
    }

    fn is_below_threshold(&self, sample: &OrientationSample) -> bool {
        let min_delta = self.config.min_angular_delta_degrees;
        if min_delta <= 0.0 {
            return false;
        }
        let Some(last) = self.history.newest() else {
            return false;
        };

        angular_difference_degrees(last.heading_degrees, sample.heading_degrees) < min_delta
            && (last.pitch_degrees - sample.pitch_degrees).abs() < min_delta
            && (last.roll_degrees - sample.roll_degrees).abs() < min_delta
    }

    fn smooth(&self, now: DateTime<Utc>) -> SmoothedOrientation {
        let mut readings = self.history.iter();
        let Some(newest) = readings.next() else {
            return SmoothedOrientation {
                heading_degrees: 0.0,
                pitch_degrees: 0.0,
                roll_degrees: 0.0,
                computed_at: now,
            };
        };

        if self.history.len() == 1 {
            return SmoothedOrientation {
                heading_degrees: newest.heading_degrees,
                pitch_degrees: newest.pitch_degrees,
                roll_degrees: newest.roll_degrees,
                computed_at: now,
            };
        }

        let weights: Vec<f64> = (0..self.history.len())
            .map(|i| recency_weight(self.config.recency_factor, i))
            .collect();
        let total_weight: f64 = weights.iter().sum();

        let heading = circular_mean_degrees(
            self.history
                .iter()
                .zip(&weights)
                .map(|(s, w)| (s.heading_degrees, *w)),
        )
        .unwrap_or(newest.heading_degrees);

        let (pitch_sum, roll_sum) = self
            .history
            .iter()
            .zip(&weights)
            .fold((0.0, 0.0), |(p, r), (s, w)| {
                (p + w * s.pitch_degrees, r + w * s.roll_degrees)
            });

        SmoothedOrientation {
            heading_degrees: heading,
            pitch_degrees: pitch_sum / total_weight,
            roll_degrees: roll_sum / total_weight,
            computed_at: now,
        }
    }
}
