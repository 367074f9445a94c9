//! Notifications emitted by a running session.
//!
//! Results and problems travel on the same channel; each event carries an
//! [`EventKind`] so the UI can decide how to present it.

use std::fmt;

use serde::Serialize;

use crate::catalog::{AnchorId, DataQualityWarning};
use crate::projection::{DegradedReason, Placement};
use crate::sensor::{SampleError, SensorError, SensorStream};
use crate::visibility::EnteredObject;

/// What the renderer needs to draw one visible object this cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlacement {
    pub id: AnchorId,
    pub model_reference: String,
    pub scale: f64,
    pub placement: Placement,
}

/// Coarse classification of a [`SessionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    VisibilityChanged,
    Placements,
    InvalidSample,
    SensorUnavailable,
    SensorTimeout,
    DegradedPlacement,
    DataQualityWarning,
    CatalogUnavailable,
}

impl EventKind {
    /// Whether this kind reports a problem rather than a result.
    pub fn is_problem(&self) -> bool {
        !matches!(self, EventKind::VisibilityChanged | EventKind::Placements)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::VisibilityChanged => "visibility_changed",
            EventKind::Placements => "placements",
            EventKind::InvalidSample => "invalid_sample",
            EventKind::SensorUnavailable => "sensor_unavailable",
            EventKind::SensorTimeout => "sensor_timeout",
            EventKind::DegradedPlacement => "degraded_placement",
            EventKind::DataQualityWarning => "data_quality_warning",
            EventKind::CatalogUnavailable => "catalog_unavailable",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification from the session to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The visible set changed. `entered` is closest first.
    VisibilityChanged {
        entered: Vec<EnteredObject>,
        exited: Vec<AnchorId>,
    },

    /// Placements for every visible object, in id order.
    Placements(Vec<RenderPlacement>),

    /// A malformed sample was rejected.
    InvalidSample {
        stream: SensorStream,
        error: SampleError,
    },

    /// A sensor reported that it cannot deliver samples. Reported once per
    /// stream.
    SensorUnavailable {
        stream: SensorStream,
        error: SensorError,
    },

    /// A sensor missed a reading.
    SensorTimeout { stream: SensorStream },

    /// An object started rendering directly ahead, or its reason changed.
    DegradedPlacement { id: AnchorId, reason: DegradedReason },

    /// A catalog record was skipped.
    DataQualityWarning(DataQualityWarning),

    /// The catalog could not be listed; the visible set was left unchanged.
    CatalogUnavailable { message: String },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::VisibilityChanged { .. } => EventKind::VisibilityChanged,
            SessionEvent::Placements(_) => EventKind::Placements,
            SessionEvent::InvalidSample { .. } => EventKind::InvalidSample,
            SessionEvent::SensorUnavailable { .. } => EventKind::SensorUnavailable,
            SessionEvent::SensorTimeout { .. } => EventKind::SensorTimeout,
            SessionEvent::DegradedPlacement { .. } => EventKind::DegradedPlacement,
            SessionEvent::DataQualityWarning(_) => EventKind::DataQualityWarning,
            SessionEvent::CatalogUnavailable { .. } => EventKind::CatalogUnavailable,
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::VisibilityChanged { entered, exited } => {
                write!(f, "visibility: {} entered, {} exited", entered.len(), exited.len())
            }
            SessionEvent::Placements(placements) => {
                write!(f, "{} placements", placements.len())
            }
            SessionEvent::InvalidSample { stream, error } => {
                write!(f, "invalid {} sample: {}", stream, error)
            }
            SessionEvent::SensorUnavailable { stream, error } => {
                write!(f, "{} sensor unavailable: {}", stream, error)
            }
            SessionEvent::SensorTimeout { stream } => write!(f, "{} sensor timed out", stream),
            SessionEvent::DegradedPlacement { id, reason } => {
                write!(f, "degraded placement for '{}': {}", id, reason)
            }
            SessionEvent::DataQualityWarning(warning) => write!(f, "{}", warning),
            SessionEvent::CatalogUnavailable { message } => {
                write!(f, "catalog unavailable: {}", message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataQualityIssue;

    #[test]
    fn test_event_kinds() {
        let event = SessionEvent::SensorTimeout {
            stream: SensorStream::Orientation,
        };
        assert_eq!(event.kind(), EventKind::SensorTimeout);
        assert!(event.kind().is_problem());

        let event = SessionEvent::Placements(Vec::new());
        assert_eq!(event.kind(), EventKind::Placements);
        assert!(!event.kind().is_problem());
    }

    #[test]
    fn test_event_display() {
        let event = SessionEvent::DataQualityWarning(DataQualityWarning {
            id: AnchorId::new("statue"),
            issue: DataQualityIssue::MissingCoordinates,
        });
        assert_eq!(
            event.to_string(),
            "Catalog record 'statue' skipped: missing coordinates"
        );

        let event = SessionEvent::SensorUnavailable {
            stream: SensorStream::Position,
            error: SensorError::PermissionDenied,
        };
        assert_eq!(
            event.to_string(),
            "position sensor unavailable: Sensor permission denied"
        );
    }

    #[test]
    fn test_kind_as_str() {
        assert_eq!(EventKind::DegradedPlacement.to_string(), "degraded_placement");
    }
}
