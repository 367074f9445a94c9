//! Integration tests for the async anchoring session.
//!
//! These tests drive `AnchoringSession::run` the way an app would:
//! - sensor readings arrive over channels
//! - the catalog is shared and may change between cycles
//! - events are observed on the session's event channel
//!
//! Time is paused, so cycle ticks advance instantly.
//!
//! Run with: `cargo test --test session_integration`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use geoanchor::visibility::VisibilityConfig;
use geoanchor::{
    sensor_channels, AnchorCatalog, AnchorId, AnchoringConfig, AnchoringSession, CatalogRecord,
    DegradedReason, EventKind, InMemoryCatalog, JsonFileCatalog, OrientationSample,
    PositionSample, SensorError, SensorFeeds, SensorStream, SessionEvent,
};

// ============================================================================
// Helper Functions
// ============================================================================

/// User standing point used throughout.
const USER: (f64, f64) = (45.0, 7.0);

/// 10.0075 m north of the user.
const TEN_M_NORTH: f64 = 45.00009;

/// Visibility radius wide enough for [`TEN_M_NORTH`].
const RADIUS_METERS: f64 = 15.0;

struct Harness {
    feeds: SensorFeeds,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<AnchoringSession>,
}

impl Harness {
    fn start(catalog: Arc<dyn AnchorCatalog>) -> Self {
        let (feeds, inputs) = sensor_channels(16);
        let (events_tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let config = AnchoringConfig {
            visibility: VisibilityConfig::default().with_radius(RADIUS_METERS),
            ..AnchoringConfig::default()
        };
        let session = AnchoringSession::new(&config);
        let handle = tokio::spawn(session.run(inputs, catalog, events_tx, cancel.clone()));
        Self {
            feeds,
            events,
            cancel,
            handle,
        }
    }

    async fn send_position(&self, lat: f64, lon: f64) {
        self.feeds
            .position
            .send(Ok(PositionSample::new(lat, lon, 5.0)))
            .await
            .unwrap();
    }

    async fn send_heading(&self, heading: f64) {
        self.feeds
            .orientation
            .send(Ok(OrientationSample::new(heading, 0.0, 0.0)))
            .await
            .unwrap();
    }

    /// Wait for the first event of the given kind, skipping others.
    async fn next_of(&mut self, kind: EventKind) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                let event = self.events.recv().await.expect("Event channel closed");
                if event.kind() == kind {
                    return event;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("No {} event within 30 s", kind))
    }

    /// Let a few cycles run, then collect everything emitted so far.
    async fn drain_after(&mut self, cycles: u32) -> Vec<SessionEvent> {
        tokio::time::sleep(Duration::from_millis(1000 * cycles as u64 + 500)).await;
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    async fn shutdown(self) -> AnchoringSession {
        self.cancel.cancel();
        self.handle.await.expect("Session task panicked")
    }
}

fn catalog_with(records: Vec<CatalogRecord>) -> Arc<InMemoryCatalog> {
    Arc::new(InMemoryCatalog::new(records))
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A user ten meters south of an object, facing north, sees it straight
/// ahead at ten meters.
#[tokio::test(start_paused = true)]
async fn test_object_enters_and_is_placed_ahead() {
    let catalog = catalog_with(vec![CatalogRecord::new(
        "statue",
        TEN_M_NORTH,
        7.0,
        "statue.glb",
    )]);
    let mut harness = Harness::start(catalog);

    harness.send_position(USER.0, USER.1).await;
    harness.send_heading(0.0).await;

    match harness.next_of(EventKind::VisibilityChanged).await {
        SessionEvent::VisibilityChanged { entered, exited } => {
            assert_eq!(entered.len(), 1);
            assert_eq!(entered[0].object.id, AnchorId::new("statue"));
            assert!((entered[0].distance_meters - 10.0).abs() < 0.01);
            assert!(exited.is_empty());
        }
        other => panic!("Unexpected event {:?}", other),
    }

    match harness.next_of(EventKind::Placements).await {
        SessionEvent::Placements(placements) => {
            assert_eq!(placements.len(), 1);
            let placement = &placements[0];
            assert_eq!(placement.model_reference, "statue.glb");
            assert!(!placement.placement.is_degraded());
            let offset = placement.placement.offset();
            assert!((offset.forward - 10.0).abs() < 0.01, "forward = {}", offset.forward);
            assert!(offset.right.abs() < 1e-6, "right = {}", offset.right);
        }
        other => panic!("Unexpected event {:?}", other),
    }

    harness.shutdown().await;
}

/// Removing an object from the store makes it exit on the next cycle.
#[tokio::test(start_paused = true)]
async fn test_object_exits_when_removed_from_catalog() {
    let catalog = catalog_with(vec![
        CatalogRecord::new("a", TEN_M_NORTH, 7.0, "a.glb"),
        CatalogRecord::new("b", 45.00002, 7.0, "b.glb"),
    ]);
    let mut harness = Harness::start(catalog.clone());

    harness.send_position(USER.0, USER.1).await;
    harness.next_of(EventKind::VisibilityChanged).await;

    assert!(catalog.remove(&AnchorId::new("a")));

    match harness.next_of(EventKind::VisibilityChanged).await {
        SessionEvent::VisibilityChanged { entered, exited } => {
            assert!(entered.is_empty());
            assert_eq!(exited, vec![AnchorId::new("a")]);
        }
        other => panic!("Unexpected event {:?}", other),
    }

    let session = harness.shutdown().await;
    assert_eq!(session.visible_ids(), vec![AnchorId::new("b")]);
}

/// Without a compass the object is placed directly ahead, reported once.
#[tokio::test(start_paused = true)]
async fn test_degraded_placement_reported_once() {
    let catalog = catalog_with(vec![CatalogRecord::new("a", TEN_M_NORTH, 7.0, "a.glb")]);
    let mut harness = Harness::start(catalog);

    harness.send_position(USER.0, USER.1).await;

    match harness.next_of(EventKind::DegradedPlacement).await {
        SessionEvent::DegradedPlacement { id, reason } => {
            assert_eq!(id, AnchorId::new("a"));
            assert_eq!(reason, DegradedReason::MissingHeading);
        }
        other => panic!("Unexpected event {:?}", other),
    }

    let later = harness.drain_after(3).await;
    assert!(
        !later.iter().any(|e| e.kind() == EventKind::DegradedPlacement),
        "Degraded placement repeated: {:?}",
        later
    );
    let placements: Vec<_> = later
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Placements(p) => Some(p),
            _ => None,
        })
        .collect();
    assert!(!placements.is_empty());
    let offset = placements[0][0].placement.offset();
    assert_eq!(offset.forward, 2.0);
    assert_eq!(offset.right, 0.0);

    harness.shutdown().await;
}

/// A denied sensor is reported once; timeouts are reported every time.
#[tokio::test(start_paused = true)]
async fn test_sensor_errors() {
    let mut harness = Harness::start(catalog_with(Vec::new()));

    for _ in 0..2 {
        harness
            .feeds
            .orientation
            .send(Err(SensorError::PermissionDenied))
            .await
            .unwrap();
        harness
            .feeds
            .position
            .send(Err(SensorError::Timeout))
            .await
            .unwrap();
    }

    let events = harness.drain_after(1).await;
    let unavailable: Vec<_> = events
        .iter()
        .filter(|e| e.kind() == EventKind::SensorUnavailable)
        .collect();
    assert_eq!(unavailable.len(), 1);
    assert_eq!(
        unavailable[0],
        &SessionEvent::SensorUnavailable {
            stream: SensorStream::Orientation,
            error: SensorError::PermissionDenied,
        }
    );

    let timeouts = events
        .iter()
        .filter(|e| e.kind() == EventKind::SensorTimeout)
        .count();
    assert_eq!(timeouts, 2);

    let session = harness.shutdown().await;
    assert!(session.smoothed_position().is_none());
    assert!(session.smoothed_orientation().is_none());
}

/// Malformed samples are rejected without disturbing the estimate.
#[tokio::test(start_paused = true)]
async fn test_invalid_sample_rejected() {
    let mut harness = Harness::start(catalog_with(Vec::new()));

    harness.send_position(USER.0, USER.1).await;
    harness
        .feeds
        .position
        .send(Ok(PositionSample::new(f64::NAN, 7.0, 5.0)))
        .await
        .unwrap();

    match harness.next_of(EventKind::InvalidSample).await {
        SessionEvent::InvalidSample { stream, .. } => {
            assert_eq!(stream, SensorStream::Position);
        }
        other => panic!("Unexpected event {:?}", other),
    }

    let session = harness.shutdown().await;
    let position = session.smoothed_position().unwrap();
    assert_eq!((position.latitude, position.longitude), USER);
}

/// Closing a stream stops its tracker but keeps the last estimate.
#[tokio::test(start_paused = true)]
async fn test_closed_streams_keep_last_estimate() {
    let catalog = catalog_with(vec![CatalogRecord::new("a", TEN_M_NORTH, 7.0, "a.glb")]);
    let mut harness = Harness::start(catalog);

    harness.send_position(USER.0, USER.1).await;
    harness.send_heading(90.0).await;
    harness.next_of(EventKind::Placements).await;

    let Harness {
        feeds,
        mut events,
        cancel,
        handle,
    } = harness;
    drop(feeds);

    // Cycles keep running on the retained estimates
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let mut saw_placements = false;
    while let Ok(event) = events.try_recv() {
        saw_placements |= event.kind() == EventKind::Placements;
    }
    assert!(saw_placements);

    cancel.cancel();
    let session = handle.await.unwrap();
    assert!(!session.is_position_tracking());
    assert!(!session.is_orientation_tracking());
    assert_eq!(session.smoothed_position().unwrap().latitude, USER.0);
    assert_eq!(session.smoothed_orientation().unwrap().heading_degrees, 90.0);
}

/// An unreadable store leaves the visible set unchanged.
#[tokio::test(start_paused = true)]
async fn test_catalog_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(JsonFileCatalog::new(dir.path().join("missing.json")));
    let mut harness = Harness::start(catalog);

    harness.send_position(USER.0, USER.1).await;

    match harness.next_of(EventKind::CatalogUnavailable).await {
        SessionEvent::CatalogUnavailable { message } => {
            assert!(message.contains("missing.json"), "message = {}", message);
        }
        other => panic!("Unexpected event {:?}", other),
    }

    let session = harness.shutdown().await;
    assert!(session.visible_ids().is_empty());
}

/// Malformed records are reported once, and good records still render.
#[tokio::test(start_paused = true)]
async fn test_data_quality_warning_reported_once() {
    let mut broken = CatalogRecord::new("broken", TEN_M_NORTH, 7.0, "broken.glb");
    broken.longitude = None;
    let catalog = catalog_with(vec![
        broken,
        CatalogRecord::new("ok", TEN_M_NORTH, 7.0, "ok.glb"),
    ]);
    let mut harness = Harness::start(catalog);

    harness.send_position(USER.0, USER.1).await;
    harness.send_heading(0.0).await;

    match harness.next_of(EventKind::DataQualityWarning).await {
        SessionEvent::DataQualityWarning(warning) => {
            assert_eq!(warning.id, AnchorId::new("broken"));
        }
        other => panic!("Unexpected event {:?}", other),
    }

    let later = harness.drain_after(2).await;
    assert!(!later
        .iter()
        .any(|e| e.kind() == EventKind::DataQualityWarning));

    let session = harness.shutdown().await;
    assert_eq!(session.visible_ids(), vec![AnchorId::new("ok")]);
}

/// A record that does not decode is skipped; its neighbours still render.
#[tokio::test(start_paused = true)]
async fn test_json_catalog_with_malformed_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    std::fs::write(
        &path,
        r#"[
            {"id": "bad", "latitude": "45.0", "longitude": 7.0},
            {"id": "good", "latitude": 45.00009, "longitude": 7.0, "model_reference": "good.glb"}
        ]"#,
    )
    .unwrap();
    let mut harness = Harness::start(Arc::new(JsonFileCatalog::new(path)));

    harness.send_position(USER.0, USER.1).await;
    harness.send_heading(0.0).await;

    match harness.next_of(EventKind::DataQualityWarning).await {
        SessionEvent::DataQualityWarning(warning) => {
            assert_eq!(warning.id, AnchorId::new("bad"));
            assert!(warning.to_string().contains("malformed record"));
        }
        other => panic!("Unexpected event {:?}", other),
    }

    match harness.next_of(EventKind::Placements).await {
        SessionEvent::Placements(placements) => {
            assert_eq!(placements.len(), 1);
            assert_eq!(placements[0].model_reference, "good.glb");
            assert!((placements[0].placement.offset().forward - 10.0).abs() < 0.01);
        }
        other => panic!("Unexpected event {:?}", other),
    }

    let session = harness.shutdown().await;
    assert_eq!(session.visible_ids(), vec![AnchorId::new("good")]);
}
