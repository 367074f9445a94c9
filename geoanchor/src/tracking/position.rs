//! Position smoothing.
//!
//! Folds raw location fixes into a single estimate, weighting each retained
//! fix by how recent it is and how accurate the sensor claimed it to be.
//!
//! # Algorithm
//!
//! 1. Prepend the fix, keep at most `history_capacity` fixes
//! 2. Keep fixes with `accuracy <= max_accuracy_meters`; if none qualify,
//!    use the newest raw fix on its own
//! 3. Weight fix `i` (newest = 0) by `recency_factor^i / (accuracy + 1)`
//! 4. Weighted mean of latitude, longitude and accuracy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::{recency_weight, SampleHistory, DEFAULT_HISTORY_CAPACITY, DEFAULT_RECENCY_FACTOR};
use super::IngestOutcome;
use crate::geo::{signed_angle_degrees, GeoPoint};
use crate::sensor::{PositionSample, SampleError};

/// Default worst accuracy (meters) a fix may report and still be averaged.
pub const DEFAULT_MAX_ACCURACY_METERS: f64 = 100.0;

/// Configuration for position smoothing.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionTrackerConfig {
    /// Number of raw fixes retained.
    pub history_capacity: usize,
    /// Fixes with a worse accuracy radius are excluded from the average.
    pub max_accuracy_meters: f64,
    /// Per-step decay of a fix's weight with age, in (0, 1).
    pub recency_factor: f64,
}

impl Default for PositionTrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_accuracy_meters: DEFAULT_MAX_ACCURACY_METERS,
            recency_factor: DEFAULT_RECENCY_FACTOR,
        }
    }
}

impl PositionTrackerConfig {
    /// Set the history capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the accuracy cutoff.
    pub fn with_max_accuracy(mut self, meters: f64) -> Self {
        self.max_accuracy_meters = meters;
        self
    }

    /// Set the recency factor.
    pub fn with_recency_factor(mut self, factor: f64) -> Self {
        self.recency_factor = factor;
        self
    }
}

/// The current best position estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedPosition {
    pub latitude: f64,
    pub longitude: f64,
    /// Weighted accuracy radius in meters.
    pub accuracy: f64,
    /// When this estimate was derived.
    pub computed_at: DateTime<Utc>,
}

impl SmoothedPosition {
    /// The estimate as a coordinate pair.
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Smooths a stream of position fixes.
///
/// # Usage
///
/// ```ignore
/// let mut tracker = PositionTracker::new();
///
/// // Feed fixes as they arrive
/// tracker.ingest(sample)?;
///
/// if let Some(position) = tracker.current() {
///     println!("Smoothed: {:.6}, {:.6}", position.latitude, position.longitude);
/// }
/// ```
#[derive(Debug)]
pub struct PositionTracker {
    /// Raw fixes (newest first).
    history: SampleHistory<PositionSample>,
    config: PositionTrackerConfig,
    /// Last derived estimate, replaced whole on each update.
    current: Option<SmoothedPosition>,
    stopped: bool,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionTracker {
    /// Create a tracker with default configuration.
    pub fn new() -> Self {
        Self::with_config(PositionTrackerConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: PositionTrackerConfig) -> Self {
        Self {
            history: SampleHistory::new(config.history_capacity),
            config,
            current: None,
            stopped: false,
        }
    }

    /// Fold a fix into the estimate, stamping it with the current time.
    pub fn ingest(
        &mut self,
        sample: PositionSample,
    ) -> Result<IngestOutcome<SmoothedPosition>, SampleError> {
        self.ingest_at(sample, Utc::now())
    }

    /// Fold a fix into the estimate with an explicit ingestion time.
    ///
    /// Malformed fixes are rejected before history is touched.
    pub fn ingest_at(
        &mut self,
        sample: PositionSample,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome<SmoothedPosition>, SampleError> {
        if self.stopped {
            return Ok(IngestOutcome::Stopped);
        }
        sample.validate()?;

        self.history.push(sample);

        match self.smooth(now) {
            Some(estimate) => {
                self.current = Some(estimate);
                tracing::debug!(
                    latitude = estimate.latitude,
                    longitude = estimate.longitude,
                    accuracy = estimate.accuracy,
                    samples = self.history.len(),
                    "Position estimate updated"
                );
                Ok(IngestOutcome::Updated(estimate))
            }
            // Unreachable with a non-empty history; keep the old estimate
            None => Ok(IngestOutcome::Throttled),
        }
    }

    /// The last derived estimate, or `None` before the first fix.
    pub fn current(&self) -> Option<SmoothedPosition> {
        self.current
    }

    /// Stop accepting fixes. The last estimate stays readable.
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

    /// Drop history and estimate and resume accepting fixes.
    pub fn reset(&mut self) {
        self.history.clear();
        self.current = None;
        self.stopped = false;
    }

    /// Number of raw fixes currently retained.
    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    pub fn config(&self) -> &PositionTrackerConfig {
        &self.config
    }

    fn smooth(&self, now: DateTime<Utc>) -> Option<SmoothedPosition> {
        let mut usable: Vec<&PositionSample> = self
            .history
            .iter()
            .filter(|s| s.accuracy <= self.config.max_accuracy_meters)
            .collect();

        if usable.is_empty() {
            // Degraded accuracy beats no estimate at all
            usable.extend(self.history.newest());
        }

        let newest = *usable.first()?;
        if usable.len() == 1 {
            return Some(SmoothedPosition {
                latitude: newest.latitude,
                longitude: newest.longitude,
                accuracy: newest.accuracy,
                computed_at: now,
            });
        }

        let mut total_weight = 0.0;
        let mut lat_sum = 0.0;
        // Longitudes are averaged as offsets from the newest fix so a history
        // straddling the antimeridian does not average to the prime meridian.
        let mut lon_offset_sum = 0.0;
        let mut accuracy_sum = 0.0;

        for (index, sample) in usable.iter().enumerate() {
            let weight =
                recency_weight(self.config.recency_factor, index) / (sample.accuracy + 1.0);
            total_weight += weight;
            lat_sum += weight * sample.latitude;
            lon_offset_sum += weight * signed_angle_degrees(sample.longitude - newest.longitude);
            accuracy_sum += weight * sample.accuracy;
        }

        if total_weight <= 0.0 || !total_weight.is_finite() {
            return None;
        }

        Some(SmoothedPosition {
            latitude: lat_sum / total_weight,
            longitude: signed_angle_degrees(newest.longitude + lon_offset_sum / total_weight),
            accuracy: accuracy_sum / total_weight,
            computed_at: now,
        })
    }
}
