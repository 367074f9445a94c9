//! GeoAnchor - geo-anchored objects for location-based AR
//!
//! This library turns noisy GPS fixes and compass readings into stable
//! estimates, decides which stored objects are close enough to render, and
//! converts their geographic coordinates into device-local placements.
//!
//! # Pipeline
//!
//! ```text
//! GPS fixes ──► PositionTracker ──┐
//!                                 ├─► VisibilitySetManager ──► ArAnchoringProjector ──► renderer
//! compass ───► OrientationTracker ┘        ▲
//!                                          │
//!                              AnchorCatalog (object store)
//! ```
//!
//! [`session::AnchoringSession`] wires the pieces together and drives them
//! from sensor channels and a cycle timer.

pub mod catalog;
pub mod config;
pub mod geo;
pub mod logging;
pub mod projection;
pub mod sensor;
pub mod session;
pub mod tracking;
pub mod visibility;

pub use catalog::{
    AnchorCatalog, AnchorId, AnchoredObject, CatalogError, CatalogRecord, DataQualityIssue,
    DataQualityWarning, InMemoryCatalog, JsonFileCatalog,
};
pub use config::{AnchoringConfig, ConfigError};
pub use geo::GeoPoint;
pub use projection::{ArAnchoringProjector, DegradedReason, LocalOffset, Placement};
pub use sensor::{
    sensor_channels, OrientationSample, PositionSample, SampleError, SensorError, SensorFeeds,
    SensorInputs, SensorStream,
};
pub use session::{AnchoringSession, EventKind, RenderPlacement, SessionError, SessionEvent};
pub use tracking::{OrientationTracker, PositionTracker, SmoothedOrientation, SmoothedPosition};
pub use visibility::{VisibilitySetManager, VisibilityUpdate};
