//! Async driver for [`AnchoringSession`].
//!
//! One task owns the session and multiplexes three sources: the position
//! stream, the orientation stream and the cycle timer. Sensor samples update
//! the trackers as they arrive; the timer runs the visibility/projection cycle
//! at its own fixed rate.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{AnchoringSession, CycleReport, SessionEvent};
use crate::catalog::AnchorCatalog;
use crate::sensor::{OrientationReading, PositionReading, SensorInputs, SensorStream};

impl AnchoringSession {
    /// Drive the session until `cancel` fires, then hand it back.
    ///
    /// A closed sensor channel stops the matching tracker; the last estimate
    /// stays readable and cycles keep running on it. Events are dropped
    /// silently once the receiver is gone.
    pub async fn run(
        mut self,
        inputs: SensorInputs,
        catalog: Arc<dyn AnchorCatalog>,
        events: mpsc::UnboundedSender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let SensorInputs {
            position: mut position_rx,
            orientation: mut orientation_rx,
        } = inputs;

        let mut position_open = true;
        let mut orientation_open = true;

        let mut ticker = interval(self.config.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            cycle_interval_ms = self.config.cycle_interval.as_millis() as u64,
            "Anchoring session started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                reading = position_rx.recv(), if position_open => match reading {
                    Some(reading) => self.on_position(reading, &events),
                    None => {
                        position_open = false;
                        tracing::debug!("Position stream closed");
                        self.stop_position_tracking();
                    }
                },

                reading = orientation_rx.recv(), if orientation_open => match reading {
                    Some(reading) => self.on_orientation(reading, &events),
                    None => {
                        orientation_open = false;
                        tracing::debug!("Orientation stream closed");
                        self.stop_orientation_tracking();
                    }
                },

                _ = ticker.tick() => self.on_tick(&catalog, &events).await,
            }
        }

        tracing::info!(visible = self.visible_ids().len(), "Anchoring session stopped");
        self
    }

    fn on_position(&mut self, reading: PositionReading, events: &mpsc::UnboundedSender<SessionEvent>) {
        match reading {
            Ok(sample) => {
                if let Err(error) = self.ingest_position(sample) {
                    tracing::warn!(error = %error, "Rejected position sample");
                    let _ = events.send(SessionEvent::InvalidSample {
                        stream: SensorStream::Position,
                        error,
                    });
                }
            }
            Err(error) => {
                if let Some(event) = self.handle_sensor_error(SensorStream::Position, error) {
                    let _ = events.send(event);
                }
            }
        }
    }

    fn on_orientation(
        &mut self,
        reading: OrientationReading,
        events: &mpsc::UnboundedSender<SessionEvent>,
    ) {
        match reading {
            Ok(sample) => {
                if let Err(error) = self.ingest_orientation(sample) {
                    tracing::warn!(error = %error, "Rejected orientation sample");
                    let _ = events.send(SessionEvent::InvalidSample {
                        stream: SensorStream::Orientation,
                        error,
                    });
                }
            }
            Err(error) => {
                if let Some(event) = self.handle_sensor_error(SensorStream::Orientation, error) {
                    let _ = events.send(event);
                }
            }
        }
    }

    async fn on_tick(
        &mut self,
        catalog: &Arc<dyn AnchorCatalog>,
        events: &mpsc::UnboundedSender<SessionEvent>,
    ) {
        if self.smoothed_position().is_none() {
            tracing::debug!("No position estimate yet, skipping cycle");
            return;
        }

        // Store listings may block on I/O; keep them off the runtime threads
        let catalog = Arc::clone(catalog);
        let listing = tokio::task::spawn_blocking(move || catalog.list_anchored_objects()).await;

        let message = match listing {
            Ok(Ok(records)) => {
                if let Some(report) = self.run_cycle(&records) {
                    publish_report(report, events);
                }
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("catalog listing task failed: {}", e),
        };

        tracing::warn!(error = %message, "Catalog unavailable, keeping visible set");
        let _ = events.send(SessionEvent::CatalogUnavailable { message });
    }
}

fn publish_report(report: CycleReport, events: &mpsc::UnboundedSender<SessionEvent>) {
    for warning in report.new_warnings {
        let _ = events.send(SessionEvent::DataQualityWarning(warning));
    }

    if report.visibility.has_changes() {
        let _ = events.send(SessionEvent::VisibilityChanged {
            entered: report.visibility.entered,
            exited: report.visibility.exited,
        });
    }

    for (id, reason) in report.newly_degraded {
        let _ = events.send(SessionEvent::DegradedPlacement { id, reason });
    }

    if !report.placements.is_empty() {
        let _ = events.send(SessionEvent::Placements(report.placements));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use crate::catalog::{CatalogError, CatalogRecord};
    use crate::config::AnchoringConfig;
    use crate::sensor::{sensor_channels, PositionSample};
    use crate::session::SessionConfig;

    /// Catalog whose listing blocks its thread until the test releases it.
    struct GatedCatalog {
        records: Vec<CatalogRecord>,
        started: Arc<Notify>,
        release: Mutex<std_mpsc::Receiver<()>>,
    }

    impl AnchorCatalog for GatedCatalog {
        fn list_anchored_objects(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
            self.started.notify_one();
            match self.release.lock().recv_timeout(Duration::from_secs(5)) {
                Ok(()) => Ok(self.records.clone()),
                Err(e) => Err(CatalogError::Io {
                    path: PathBuf::from("gated"),
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, e.to_string()),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_blocking_catalog_does_not_stall_runtime() {
        let (release_tx, release_rx) = std_mpsc::channel();
        let started = Arc::new(Notify::new());
        let catalog = Arc::new(GatedCatalog {
            records: vec![CatalogRecord::new("a", 45.0, 7.0, "a.glb")],
            started: Arc::clone(&started),
            release: Mutex::new(release_rx),
        });

        let config = AnchoringConfig {
            session: SessionConfig::default().with_cycle_interval(Duration::from_millis(10)),
            ..AnchoringConfig::default()
        };
        let (feeds, inputs) = sensor_channels(8);
        feeds
            .position
            .send(Ok(PositionSample::new(45.0, 7.0, 5.0)))
            .await
            .unwrap();

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(AnchoringSession::new(&config).run(
            inputs,
            catalog,
            events_tx,
            cancel.clone(),
        ));

        // On a current-thread runtime this only runs if the listing is
        // parked on the blocking pool
        started.notified().await;
        release_tx.send(()).unwrap();
        drop(release_tx);

        let event = events_rx.recv().await.unwrap();
        match event {
            SessionEvent::VisibilityChanged { entered, exited } => {
                assert_eq!(entered.len(), 1);
                assert_eq!(entered[0].object.id.as_str(), "a");
                assert!(exited.is_empty());
            }
            other => panic!("Expected VisibilityChanged, got {:?}", other),
        }

        cancel.cancel();
        let session = handle.await.unwrap();
        assert_eq!(session.visible_ids().len(), 1);
        drop(feeds);
    }
}
