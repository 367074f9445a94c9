//! Raw sensor samples and the streams that deliver them.
//!
//! The device's location and compass APIs are external collaborators. They
//! push samples (or distinguished errors) into two independent channels which
//! the session drains. Nothing here smooths or interprets the data.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Default capacity of each sensor channel created by [`sensor_channels`].
pub const DEFAULT_SENSOR_CHANNEL_CAPACITY: usize = 64;

/// A raw position fix from the location sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Horizontal accuracy radius in meters (smaller is better).
    pub accuracy: f64,
    /// When the sensor captured this fix.
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    /// Create a sample captured now.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self::with_timestamp(latitude, longitude, accuracy, Utc::now())
    }

    /// Create a sample with an explicit capture time.
    pub fn with_timestamp(
        latitude: f64,
        longitude: f64,
        accuracy: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            captured_at,
        }
    }

    /// Check that the sample can be folded into a position estimate.
    pub fn validate(&self) -> Result<(), SampleError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(SampleError::InvalidLatitude(self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(SampleError::InvalidLongitude(self.longitude));
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(SampleError::InvalidAccuracy(self.accuracy));
        }
        Ok(())
    }
}

/// A raw compass/tilt reading from the orientation sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    /// Compass heading in degrees, clockwise from north.
    pub heading_degrees: f64,
    /// Device pitch in degrees.
    pub pitch_degrees: f64,
    /// Device roll in degrees.
    pub roll_degrees: f64,
    /// When the sensor captured this reading.
    pub captured_at: DateTime<Utc>,
}

impl OrientationSample {
    /// Create a sample captured now.
    pub fn new(heading_degrees: f64, pitch_degrees: f64, roll_degrees: f64) -> Self {
        Self::with_timestamp(heading_degrees, pitch_degrees, roll_degrees, Utc::now())
    }

    /// Create a sample with an explicit capture time.
    pub fn with_timestamp(
        heading_degrees: f64,
        pitch_degrees: f64,
        roll_degrees: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            heading_degrees,
            pitch_degrees,
            roll_degrees,
            captured_at,
        }
    }

    /// Check that every angle is a finite number.
    pub fn validate(&self) -> Result<(), SampleError> {
        if !self.heading_degrees.is_finite() {
            return Err(SampleError::InvalidHeading(self.heading_degrees));
        }
        if !self.pitch_degrees.is_finite() || !self.roll_degrees.is_finite() {
            return Err(SampleError::InvalidTilt {
                pitch: self.pitch_degrees,
                roll: self.roll_degrees,
            });
        }
        Ok(())
    }
}

/// Reasons a raw sample is rejected before it touches tracker history.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SampleError {
    /// Latitude is not a finite number in `[-90, 90]`.
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// Longitude is not a finite number in `[-180, 180]`.
    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),

    /// Accuracy is negative or not finite.
    #[error("Invalid accuracy: {0} m")]
    InvalidAccuracy(f64),

    /// Heading is not finite.
    #[error("Invalid heading: {0}")]
    InvalidHeading(f64),

    /// Pitch or roll is not finite.
    #[error("Invalid tilt: pitch {pitch}, roll {roll}")]
    InvalidTilt { pitch: f64, roll: f64 },
}

/// Errors delivered by a sensor collaborator in place of a sample.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SensorError {
    /// The user denied access to the sensor.
    #[error("Sensor permission denied")]
    PermissionDenied,

    /// The sensor did not deliver a reading in time.
    #[error("Sensor timed out")]
    Timeout,

    /// The sensor API is absent on this device.
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),
}

impl SensorError {
    /// Whether this error means the stream will never produce samples.
    ///
    /// Timeouts are transient; permission denial and a missing API are not.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, SensorError::Timeout)
    }
}

/// Which of the two input streams an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStream {
    Position,
    Orientation,
}

impl std::fmt::Display for SensorStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorStream::Position => write!(f, "position"),
            SensorStream::Orientation => write!(f, "orientation"),
        }
    }
}

/// One delivery on the position stream.
pub type PositionReading = Result<PositionSample, SensorError>;

/// One delivery on the orientation stream.
pub type OrientationReading = Result<OrientationSample, SensorError>;

/// Receiving halves of the two sensor streams, consumed by the session.
#[derive(Debug)]
pub struct SensorInputs {
    pub position: mpsc::Receiver<PositionReading>,
    pub orientation: mpsc::Receiver<OrientationReading>,
}

/// Sending halves of the two sensor streams, held by the sensor collaborator.
#[derive(Debug, Clone)]
pub struct SensorFeeds {
    pub position: mpsc::Sender<PositionReading>,
    pub orientation: mpsc::Sender<OrientationReading>,
}

/// Create matching sender/receiver pairs for both sensor streams.
pub fn sensor_channels(capacity: usize) -> (SensorFeeds, SensorInputs) {
    let (position_tx, position_rx) = mpsc::channel(capacity);
    let (orientation_tx, orientation_rx) = mpsc::channel(capacity);
    (
        SensorFeeds {
            position: position_tx,
            orientation: orientation_tx,
        },
        SensorInputs {
            position: position_rx,
            orientation: orientation_rx,
        },
    )
}

/// A recorded stream error, replayed at its capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSensorError {
    pub stream: SensorStream,
    pub error: SensorError,
    pub captured_at: DateTime<Utc>,
}

/// A recorded sensor session, used to replay real walks deterministically.
///
/// Stored as JSON:
///
/// ```json
/// {
///   "position": [{"latitude": 45.0, "longitude": 7.0, "accuracy": 5.0,
///                 "captured_at": "2024-05-01T10:00:00Z"}],
///   "orientation": [{"heading_degrees": 12.0, "pitch_degrees": 0.0,
///                    "roll_degrees": 0.0, "captured_at": "2024-05-01T10:00:00Z"}],
///   "errors": []
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorTrace {
    #[serde(default)]
    pub position: Vec<PositionSample>,
    #[serde(default)]
    pub orientation: Vec<OrientationSample>,
    #[serde(default)]
    pub errors: Vec<RecordedSensorError>,
}

/// Errors loading a recorded trace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed trace JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single trace entry in replay order.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Position(PositionReading),
    Orientation(OrientationReading),
}

impl SensorTrace {
    /// Parse a trace from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, TraceError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a trace file.
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Whether the trace holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.position.is_empty() && self.orientation.is_empty() && self.errors.is_empty()
    }

    /// Merge the three recorded lists into one timeline by capture time.
    ///
    /// Each list is delivered in recorded order, never re-sorted; the merge
    /// only decides which list goes next by comparing their heads. Ties go to
    /// position, then orientation, then errors.
    pub fn timeline(&self) -> Vec<(DateTime<Utc>, TraceEvent)> {
        let mut position = self
            .position
            .iter()
            .map(|s| (s.captured_at, TraceEvent::Position(Ok(*s))))
            .peekable();
        let mut orientation = self
            .orientation
            .iter()
            .map(|s| (s.captured_at, TraceEvent::Orientation(Ok(*s))))
            .peekable();
        let mut errors = self
            .errors
            .iter()
            .map(|e| {
                let event = match e.stream {
                    SensorStream::Position => TraceEvent::Position(Err(e.error.clone())),
                    SensorStream::Orientation => TraceEvent::Orientation(Err(e.error.clone())),
                };
                (e.captured_at, event)
            })
            .peekable();

        let mut events = Vec::with_capacity(
            self.position.len() + self.orientation.len() + self.errors.len(),
        );
        loop {
            let heads = [
                position.peek().map(|(at, _)| *at),
                orientation.peek().map(|(at, _)| *at),
                errors.peek().map(|(at, _)| *at),
            ];
            let next = heads
                .into_iter()
                .enumerate()
                .filter_map(|(list, head)| head.map(|at| (at, list)))
                .min();

            let entry = match next {
                Some((_, 0)) => position.next(),
                Some((_, 1)) => orientation.next(),
                Some(_) => errors.next(),
                None => break,
            };
            events.extend(entry);
        }
        events
    }
}
