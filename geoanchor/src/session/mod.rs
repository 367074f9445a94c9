//! Anchoring session: trackers, visibility and projection wired together.
//!
//! The session owns every piece of mutable state (both trackers, the visible
//! set and the projector) and is driven from a single task, so none of it
//! needs locking.
//!
//! # Architecture
//!
//! ```text
//! position stream ────► ingest_position ────┐
//!                                           ├─► smoothed estimates (watch)
//! orientation stream ─► ingest_orientation ─┘
//!
//! cycle timer ────────► run_cycle ──► VisibilitySetManager ──► ArAnchoringProjector
//!                                              │                        │
//!                                              ▼                        ▼
//!                                      VisibilityChanged            Placements
//! ```
//!
//! The synchronous methods are the update surface; [`AnchoringSession::run`]
//! is the async driver that feeds them from channels and a timer.
//!
//! # Example
//!
//! ```ignore
//! let (feeds, inputs) = sensor_channels(DEFAULT_SENSOR_CHANNEL_CAPACITY);
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let session = AnchoringSession::new(&AnchoringConfig::default());
//! let cancel = CancellationToken::new();
//!
//! let handle = tokio::spawn(session.run(inputs, catalog, events_tx, cancel.clone()));
//! while let Some(event) = events_rx.recv().await {
//!     println!("{}", event);
//! }
//! ```

mod events;
mod runner;

pub use events::{EventKind, RenderPlacement, SessionEvent};

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use crate::catalog::{AnchorId, AnchoredObject, CatalogRecord, DataQualityWarning};
use crate::config::AnchoringConfig;
use crate::projection::{ArAnchoringProjector, DegradedReason, Placement};
use crate::sensor::{OrientationSample, PositionSample, SampleError, SensorError, SensorStream};
use crate::tracking::{
    IngestOutcome, OrientationTracker, PositionTracker, SmoothedOrientation, SmoothedPosition,
};
use crate::visibility::{VisibilitySetManager, VisibilityUpdate};

/// Default period of the visibility/projection cycle.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_millis(1000);

/// Configuration for the session driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Period of the visibility/projection cycle, independent of sensor rates.
    pub cycle_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
        }
    }
}

impl SessionConfig {
    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }
}

/// Errors from session queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The object is not in the current visible set.
    #[error("Object '{0}' is not currently visible")]
    UnknownObject(AnchorId),
}

/// Output of one visibility/projection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub visibility: VisibilityUpdate,
    /// Placements for every visible object, in id order.
    pub placements: Vec<RenderPlacement>,
    /// Objects whose degraded reason appeared or changed this cycle.
    pub newly_degraded: Vec<(AnchorId, DegradedReason)>,
    /// Data-quality warnings not reported in an earlier cycle.
    pub new_warnings: Vec<DataQualityWarning>,
}

impl CycleReport {
    /// Placements that fell back to directly ahead.
    pub fn degraded(&self) -> impl Iterator<Item = (&AnchorId, DegradedReason)> {
        self.placements
            .iter()
            .filter_map(|p| p.placement.degraded_reason().map(|r| (&p.id, r)))
    }
}

/// Owns all anchoring state for one AR session.
#[derive(Debug)]
pub struct AnchoringSession {
    position: PositionTracker,
    orientation: OrientationTracker,
    visibility: VisibilitySetManager,
    projector: ArAnchoringProjector,
    config: SessionConfig,

    /// Validated records of the currently visible objects.
    visible_objects: HashMap<AnchorId, AnchoredObject>,

    /// Published estimates; receivers always see whole values.
    position_tx: watch::Sender<Option<SmoothedPosition>>,
    orientation_tx: watch::Sender<Option<SmoothedOrientation>>,

    /// Streams already reported as permanently unavailable.
    unavailable_streams: HashSet<SensorStream>,

    /// Visible objects currently placed directly ahead, by reason.
    degraded: HashMap<AnchorId, DegradedReason>,

    /// Warnings raised by the previous cycle.
    reported_warnings: Vec<DataQualityWarning>,
}

impl Default for AnchoringSession {
    fn default() -> Self {
        Self::new(&AnchoringConfig::default())
    }
}

impl AnchoringSession {
    /// Create a session from the full configuration.
    pub fn new(config: &AnchoringConfig) -> Self {
        let (position_tx, _) = watch::channel(None);
        let (orientation_tx, _) = watch::channel(None);
        Self {
            position: PositionTracker::with_config(config.position.clone()),
            orientation: OrientationTracker::with_config(config.orientation.clone()),
            visibility: VisibilitySetManager::with_config(config.visibility.clone()),
            projector: ArAnchoringProjector::with_config(config.projection.clone()),
            config: config.session.clone(),
            visible_objects: HashMap::new(),
            position_tx,
            orientation_tx,
            unavailable_streams: HashSet::new(),
            degraded: HashMap::new(),
            reported_warnings: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sensor ingestion
    // ─────────────────────────────────────────────────────────────────────

    /// Fold a position fix into the smoothed estimate.
    pub fn ingest_position(
        &mut self,
        sample: PositionSample,
    ) -> Result<IngestOutcome<SmoothedPosition>, SampleError> {
        let outcome = self.position.ingest(sample)?;
        if let IngestOutcome::Updated(estimate) = outcome {
            self.position_tx.send_replace(Some(estimate));
        }
        Ok(outcome)
    }

    /// Fold a compass reading into the smoothed estimate.
    pub fn ingest_orientation(
        &mut self,
        sample: OrientationSample,
    ) -> Result<IngestOutcome<SmoothedOrientation>, SampleError> {
        let outcome = self.orientation.ingest(sample)?;
        if let IngestOutcome::Updated(estimate) = outcome {
            self.orientation_tx.send_replace(Some(estimate));
        }
        Ok(outcome)
    }

    /// Record a sensor error delivered in place of a sample.
    ///
    /// Returns the event to publish, or `None` when a permanent failure of
    /// this stream was already reported.
    pub fn handle_sensor_error(
        &mut self,
        stream: SensorStream,
        error: SensorError,
    ) -> Option<SessionEvent> {
        if !error.is_permanent() {
            tracing::warn!(stream = %stream, "Sensor timed out");
            return Some(SessionEvent::SensorTimeout { stream });
        }

        if !self.unavailable_streams.insert(stream) {
            return None;
        }

        tracing::warn!(stream = %stream, error = %error, "Sensor unavailable, no estimate until it recovers");
        Some(SessionEvent::SensorUnavailable { stream, error })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Estimates
    // ─────────────────────────────────────────────────────────────────────

    /// Last smoothed position, if any fix has been accepted.
    pub fn smoothed_position(&self) -> Option<SmoothedPosition> {
        self.position.current()
    }

    /// Last smoothed orientation, if any reading has been accepted.
    pub fn smoothed_orientation(&self) -> Option<SmoothedOrientation> {
        self.orientation.current()
    }

    /// Watch the smoothed position from another task.
    pub fn subscribe_position(&self) -> watch::Receiver<Option<SmoothedPosition>> {
        self.position_tx.subscribe()
    }

    /// Watch the smoothed orientation from another task.
    pub fn subscribe_orientation(&self) -> watch::Receiver<Option<SmoothedOrientation>> {
        self.orientation_tx.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Stop position tracking. Idempotent; the last estimate stays readable.
    pub fn stop_position_tracking(&mut self) -> bool {
        let stopped = self.position.stop();
        if stopped {
            tracing::info!("Position tracking stopped");
        }
        stopped
    }

    /// Stop orientation tracking. Idempotent; the last estimate stays readable.
    pub fn stop_orientation_tracking(&mut self) -> bool {
        let stopped = self.orientation.stop();
        if stopped {
            tracing::info!("Orientation tracking stopped");
        }
        stopped
    }

    /// Stop both trackers.
    pub fn stop(&mut self) {
        self.stop_position_tracking();
        self.stop_orientation_tracking();
    }

    /// Forget all estimates and visible objects and resume tracking.
    ///
    /// Returns the ids that left the visible set, in id order, so the
    /// caller can drop them from the scene.
    pub fn reset(&mut self) -> Vec<AnchorId> {
        self.position.reset();
        self.orientation.reset();
        let exited = self.visibility.clear();
        self.visible_objects.clear();
        self.unavailable_streams.clear();
        self.degraded.clear();
        self.reported_warnings.clear();
        self.position_tx.send_replace(None);
        self.orientation_tx.send_replace(None);
        tracing::info!(exited = exited.len(), "Anchoring session reset");
        exited
    }

    pub fn is_position_tracking(&self) -> bool {
        !self.position.is_stopped()
    }

    pub fn is_orientation_tracking(&self) -> bool {
        !self.orientation.is_stopped()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Visibility and projection
    // ─────────────────────────────────────────────────────────────────────

    /// Run one visibility/projection cycle against a catalog snapshot.
    ///
    /// Returns `None` while there is no position estimate; the visible set
    /// is left untouched in that case.
    pub fn run_cycle(&mut self, records: &[CatalogRecord]) -> Option<CycleReport> {
        let position = self.position.current()?;
        let visibility = self.visibility.update(&position, records);

        // Rebuilt every cycle so store edits reach members that stayed
        // visible. The first valid record for an id wins, as in the manager.
        let mut objects: HashMap<AnchorId, AnchoredObject> =
            HashMap::with_capacity(self.visibility.len());
        for record in records {
            if objects.contains_key(&record.id) || !self.visibility.contains(&record.id) {
                continue;
            }
            if let Ok(object) = record.validate() {
                objects.insert(object.id.clone(), object);
            }
        }
        self.visible_objects = objects;

        let heading = self.orientation.heading();
        let placements: Vec<RenderPlacement> = self
            .visibility
            .visible_ids()
            .filter_map(|id| self.visible_objects.get(id))
            .map(|object| RenderPlacement {
                id: object.id.clone(),
                model_reference: object.model_reference.clone(),
                scale: object.scale,
                placement: self.projector.project(object, &position, heading),
            })
            .collect();

        let newly_degraded = self.track_degraded(&placements);
        let new_warnings = self.track_warnings(&visibility.warnings);

        tracing::debug!(
            visible = self.visibility.len(),
            entered = visibility.entered.len(),
            exited = visibility.exited.len(),
            degraded = self.degraded.len(),
            "Visibility cycle complete"
        );

        Some(CycleReport {
            visibility,
            placements,
            newly_degraded,
            new_warnings,
        })
    }

    /// Replace the degraded set, returning entries that are new or changed.
    fn track_degraded(&mut self, placements: &[RenderPlacement]) -> Vec<(AnchorId, DegradedReason)> {
        let current: HashMap<AnchorId, DegradedReason> = placements
            .iter()
            .filter_map(|p| p.placement.degraded_reason().map(|r| (p.id.clone(), r)))
            .collect();

        let mut changed: Vec<(AnchorId, DegradedReason)> = current
            .iter()
            .filter(|(id, reason)| self.degraded.get(*id) != Some(*reason))
            .map(|(id, reason)| (id.clone(), *reason))
            .collect();
        changed.sort_by(|a, b| a.0.cmp(&b.0));

        for (id, reason) in &changed {
            tracing::warn!(id = %id, reason = %reason, "Placing object directly ahead");
        }
        if !self.degraded.is_empty() && current.is_empty() {
            tracing::info!("All visible objects anchored");
        }

        self.degraded = current;
        changed
    }

    /// Remember this cycle's warnings, returning those not seen last time.
    fn track_warnings(&mut self, warnings: &[DataQualityWarning]) -> Vec<DataQualityWarning> {
        let fresh: Vec<DataQualityWarning> = warnings
            .iter()
            .filter(|w| !self.reported_warnings.contains(w))
            .cloned()
            .collect();

        self.reported_warnings = warnings.to_vec();
        fresh
    }

    /// Project a single visible object for rendering right now.
    pub fn project_for_render(&self, id: &AnchorId) -> Result<Placement, SessionError> {
        let object = self
            .visible_objects
            .get(id)
            .ok_or_else(|| SessionError::UnknownObject(id.clone()))?;

        Ok(match self.position.current() {
            Some(position) => self
                .projector
                .project(object, &position, self.orientation.heading()),
            None => self.projector.project_without_position(object),
        })
    }

    /// Ids of the currently visible objects, in id order.
    pub fn visible_ids(&self) -> Vec<AnchorId> {
        self.visibility.visible_ids().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::VisibilityConfig;

    /// 10.0075 m north of (45.0, 7.0), just past the default radius.
    const TEN_M_NORTH: f64 = 45.00009;

    /// Defaults with a 15 m radius so the ten-meter object is in range.
    fn config() -> AnchoringConfig {
        AnchoringConfig {
            visibility: VisibilityConfig::default().with_radius(15.0),
            ..AnchoringConfig::default()
        }
    }

    fn catalog() -> Vec<CatalogRecord> {
        vec![
            CatalogRecord::new("near", TEN_M_NORTH, 7.0, "near.glb"),
            CatalogRecord::new("close", 45.00003, 7.0, "close.glb").with_heading(90.0),
            CatalogRecord::new("far", 45.01, 7.0, "far.glb"),
        ]
    }

    fn session_at(lat: f64, lon: f64) -> AnchoringSession {
        let mut session = AnchoringSession::new(&config());
        session
            .ingest_position(PositionSample::new(lat, lon, 5.0))
            .unwrap();
        session
    }

    #[test]
    fn test_no_cycle_without_position() {
        let mut session = AnchoringSession::default();
        assert!(session.run_cycle(&catalog()).is_none());
        assert!(session.visible_ids().is_empty());
    }

    #[test]
    fn test_cycle_reports_entries_and_placements() {
        let mut session = session_at(45.0, 7.0);
        session
            .ingest_orientation(OrientationSample::new(0.0, 0.0, 0.0))
            .unwrap();

        let report = session.run_cycle(&catalog()).unwrap();
        let entered: Vec<&str> = report
            .visibility
            .entered
            .iter()
            .map(|e| e.object.id.as_str())
            .collect();
        assert_eq!(entered, vec!["close", "near"]);
        assert_eq!(report.placements.len(), 2);
        assert_eq!(report.degraded().count(), 0);

        let near = report
            .placements
            .iter()
            .find(|p| p.id.as_str() == "near")
            .unwrap();
        let offset = near.placement.offset();
        assert!((offset.forward - 10.0).abs() < 0.01);
        assert!(offset.right.abs() < 1e-6);
    }

    #[test]
    fn test_placements_degraded_without_heading() {
        let mut session = session_at(45.0, 7.0);
        let report = session.run_cycle(&catalog()).unwrap();
        assert_eq!(report.degraded().count(), 2);
        assert!(report
            .degraded()
            .all(|(_, reason)| reason == DegradedReason::MissingHeading));
    }

    #[test]
    fn test_degraded_reported_on_transition_only() {
        let mut session = session_at(45.0, 7.0);
        let first = session.run_cycle(&catalog()).unwrap();
        assert_eq!(first.newly_degraded.len(), 2);
        assert_eq!(first.newly_degraded[0].0.as_str(), "close");

        let second = session.run_cycle(&catalog()).unwrap();
        assert!(second.newly_degraded.is_empty(), "Unchanged reason must not repeat");
        assert_eq!(second.degraded().count(), 2);

        session
            .ingest_orientation(OrientationSample::new(0.0, 0.0, 0.0))
            .unwrap();
        let third = session.run_cycle(&catalog()).unwrap();
        assert!(third.newly_degraded.is_empty());
        assert_eq!(third.degraded().count(), 0);
    }

    #[test]
    fn test_warnings_reported_once_until_changed() {
        let mut session = session_at(45.0, 7.0);
        let mut records = catalog();
        records.push(CatalogRecord::new("bad", 91.0, 7.0, "bad.glb"));

        let first = session.run_cycle(&records).unwrap();
        assert_eq!(first.new_warnings.len(), 1);
        assert_eq!(first.visibility.warnings.len(), 1);

        let second = session.run_cycle(&records).unwrap();
        assert!(second.new_warnings.is_empty());
        assert_eq!(second.visibility.warnings.len(), 1);

        // A different problem on the same record is reported again
        records[3] = CatalogRecord::new("bad", 45.0, 7.0, "bad.glb").with_scale(0.0);
        let third = session.run_cycle(&records).unwrap();
        assert_eq!(third.new_warnings.len(), 1);
    }

    #[test]
    fn test_project_for_render() {
        let mut session = session_at(45.0, 7.0);
        session
            .ingest_orientation(OrientationSample::new(0.0, 0.0, 0.0))
            .unwrap();
        session.run_cycle(&catalog());

        let placement = session.project_for_render(&AnchorId::new("close")).unwrap();
        assert!(!placement.is_degraded());
        assert_eq!(placement.offset().rotation_degrees, 270.0);

        let missing = session.project_for_render(&AnchorId::new("far"));
        assert_eq!(
            missing,
            Err(SessionError::UnknownObject(AnchorId::new("far")))
        );
    }

    #[test]
    fn test_catalog_edits_reach_visible_objects() {
        let mut session = session_at(45.0, 7.0);
        session
            .ingest_orientation(OrientationSample::new(0.0, 0.0, 0.0))
            .unwrap();
        session.run_cycle(&catalog());

        let mut edited = catalog();
        edited[1] = edited[1].clone().with_heading(180.0);
        let report = session.run_cycle(&edited).unwrap();
        assert!(!report.visibility.has_changes());

        let placement = session.project_for_render(&AnchorId::new("close")).unwrap();
        assert_eq!(placement.offset().rotation_degrees, 180.0);
    }

    #[test]
    fn test_default_radius_excludes_ten_meter_object() {
        let mut session = AnchoringSession::default();
        session
            .ingest_position(PositionSample::new(45.0, 7.0, 5.0))
            .unwrap();

        let report = session.run_cycle(&catalog()).unwrap();
        assert_eq!(session.visible_ids(), vec![AnchorId::new("close")]);
        assert_eq!(report.placements.len(), 1);
    }

    #[test]
    fn test_duplicate_id_renders_first_valid_record() {
        let mut session = session_at(45.0, 7.0);
        session
            .ingest_orientation(OrientationSample::new(0.0, 0.0, 0.0))
            .unwrap();
        let records = vec![
            CatalogRecord::new("x", 45.00001, 7.0, "first.glb"),
            CatalogRecord::new("x", 45.00008, 7.0, "second.glb"),
        ];

        for _ in 0..2 {
            let report = session.run_cycle(&records).unwrap();
            assert_eq!(report.placements.len(), 1);
            let placement = &report.placements[0];
            assert_eq!(placement.model_reference, "first.glb");
            assert!((placement.placement.offset().forward - 1.11).abs() < 0.01);
        }
    }

    #[test]
    fn test_two_warnings_for_one_id_reported_once() {
        let mut session = session_at(45.0, 7.0);
        let mut broken = CatalogRecord::new("x", 45.00001, 7.0, "x.glb");
        broken.latitude = None;
        let records = vec![
            broken,
            CatalogRecord::new("x", 45.00002, 7.0, "x.glb"),
            CatalogRecord::new("x", 45.00003, 7.0, "x.glb"),
        ];

        let first = session.run_cycle(&records).unwrap();
        assert_eq!(first.new_warnings.len(), 2);

        let second = session.run_cycle(&records).unwrap();
        assert!(second.new_warnings.is_empty(), "{:?}", second.new_warnings);
        assert_eq!(second.visibility.warnings.len(), 2);
    }

    #[test]
    fn test_stop_keeps_estimates_and_visible_set() {
        let mut session = session_at(45.0, 7.0);
        session.run_cycle(&catalog());

        assert!(session.stop_position_tracking());
        assert!(!session.stop_position_tracking());
        assert!(!session.is_position_tracking());

        let outcome = session
            .ingest_position(PositionSample::new(46.0, 8.0, 5.0))
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Stopped);
        assert_eq!(session.smoothed_position().unwrap().latitude, 45.0);

        let report = session.run_cycle(&catalog()).unwrap();
        assert!(!report.visibility.has_changes());
        assert_eq!(session.visible_ids().len(), 2);
    }

    #[test]
    fn test_watch_receivers_see_latest_estimate() {
        let mut session = AnchoringSession::default();
        let position_rx = session.subscribe_position();
        let orientation_rx = session.subscribe_orientation();
        assert!(position_rx.borrow().is_none());

        session
            .ingest_position(PositionSample::new(45.0, 7.0, 5.0))
            .unwrap();
        session
            .ingest_orientation(OrientationSample::new(33.0, 0.0, 0.0))
            .unwrap();

        assert_eq!(position_rx.borrow().unwrap().latitude, 45.0);
        assert_eq!(orientation_rx.borrow().unwrap().heading_degrees, 33.0);
    }

    #[test]
    fn test_sensor_unavailable_reported_once_per_stream() {
        let mut session = AnchoringSession::default();
        let first = session.handle_sensor_error(SensorStream::Position, SensorError::PermissionDenied);
        assert!(matches!(first, Some(SessionEvent::SensorUnavailable { .. })));

        let again = session.handle_sensor_error(SensorStream::Position, SensorError::PermissionDenied);
        assert!(again.is_none());

        let other = session.handle_sensor_error(
            SensorStream::Orientation,
            SensorError::Unavailable("no magnetometer".into()),
        );
        assert!(other.is_some());

        let timeout = session.handle_sensor_error(SensorStream::Position, SensorError::Timeout);
        assert_eq!(
            timeout,
            Some(SessionEvent::SensorTimeout {
                stream: SensorStream::Position
            })
        );
        assert!(session.smoothed_position().is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = session_at(45.0, 7.0);
        let position_rx = session.subscribe_position();
        session.run_cycle(&catalog());
        session.stop();

        let exited = session.reset();
        assert_eq!(exited, vec![AnchorId::new("close"), AnchorId::new("near")]);
        assert!(session.smoothed_position().is_none());
        assert!(session.visible_ids().is_empty());
        assert!(session.is_position_tracking());
        assert!(position_rx.borrow().is_none());
        assert!(session.project_for_render(&AnchorId::new("near")).is_err());
        assert!(session.reset().is_empty());
    }

    #[test]
    fn test_objects_reenter_after_reset() {
        let mut session = session_at(45.0, 7.0);
        session.run_cycle(&catalog());
        session.reset();

        session
            .ingest_position(PositionSample::new(45.0, 7.0, 5.0))
            .unwrap();
        let report = session.run_cycle(&catalog()).unwrap();
        assert_eq!(report.visibility.entered.len(), 2);
        assert!(report.visibility.exited.is_empty());
    }
}
