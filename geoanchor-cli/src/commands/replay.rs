//! Replay command - drive a live session from a recorded sensor trace.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use geoanchor::catalog::{AnchorCatalog, JsonFileCatalog};
use geoanchor::config::AnchoringConfig;
use geoanchor::sensor::{
    sensor_channels, SensorFeeds, SensorTrace, TraceEvent, DEFAULT_SENSOR_CHANNEL_CAPACITY,
};
use geoanchor::session::{AnchoringSession, EventKind, SessionEvent};

use super::output::print_event;
use crate::error::CliError;

/// Arguments for the replay command.
pub struct ReplayArgs {
    pub trace: PathBuf,
    pub catalog: PathBuf,
    pub config: Option<PathBuf>,
    pub speed: f64,
    pub verbose: bool,
}

/// Counts of what the replay produced.
#[derive(Debug, Default)]
struct ReplayStats {
    entered: usize,
    exited: usize,
    problems: usize,
    cycles: usize,
}

impl ReplayStats {
    fn record(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::VisibilityChanged { entered, exited } => {
                self.entered += entered.len();
                self.exited += exited.len();
            }
            SessionEvent::Placements(_) => self.cycles += 1,
            e if e.kind().is_problem() => self.problems += 1,
            _ => {}
        }
    }
}

/// Run the replay command.
pub fn run(args: ReplayArgs) -> Result<(), CliError> {
    if !(args.speed.is_finite() && args.speed > 0.0) {
        return Err(CliError::InvalidArgument(format!(
            "--speed must be a positive number, got {}",
            args.speed
        )));
    }

    let (config, _guard) = super::prepare(args.config.as_deref(), args.verbose)?;

    let trace = SensorTrace::load(&args.trace).map_err(|source| CliError::Trace {
        path: args.trace.clone(),
        source,
    })?;
    if trace.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "trace {} has no entries",
            args.trace.display()
        )));
    }

    let catalog: Arc<dyn AnchorCatalog> = Arc::new(JsonFileCatalog::new(&args.catalog));
    let record_count = catalog.list_anchored_objects()?.len();

    println!(
        "Replaying {} position and {} orientation samples at {}x against {} objects",
        trace.position.len(),
        trace.orientation.len(),
        args.speed,
        record_count
    );
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let (session, stats) = runtime.block_on(replay(trace, catalog, config, args.speed))?;

    println!();
    println!("Replay Summary");
    println!("──────────────");
    println!("  Cycles:    {}", stats.cycles);
    println!("  Entered:   {}", stats.entered);
    println!("  Exited:    {}", stats.exited);
    println!("  Problems:  {}", stats.problems);
    match session.smoothed_position() {
        Some(p) => println!(
            "  Position:  ({:.6}, {:.6}) ±{:.1} m",
            p.latitude, p.longitude, p.accuracy
        ),
        None => println!("  Position:  none"),
    }
    match session.smoothed_orientation() {
        Some(o) => println!("  Heading:   {:.1}°", o.heading_degrees),
        None => println!("  Heading:   none"),
    }
    let visible = session.visible_ids();
    if visible.is_empty() {
        println!("  Visible:   none");
    } else {
        let ids: Vec<&str> = visible.iter().map(|id| id.as_str()).collect();
        println!("  Visible:   {}", ids.join(", "));
    }

    Ok(())
}

async fn replay(
    trace: SensorTrace,
    catalog: Arc<dyn AnchorCatalog>,
    config: AnchoringConfig,
    speed: f64,
) -> Result<(AnchoringSession, ReplayStats), CliError> {
    let (feeds, inputs) = sensor_channels(DEFAULT_SENSOR_CHANNEL_CAPACITY);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping replay...");
        signal_cancel.cancel();
    })
    .map_err(|e| CliError::SignalHandler(e.to_string()))?;

    let cycle_interval = config.session.cycle_interval;
    let session = AnchoringSession::new(&config);
    let session_task = tokio::spawn(session.run(inputs, catalog, events_tx, cancel.clone()));

    let feeder_cancel = cancel.clone();
    let timeline = trace.timeline();
    tokio::spawn(async move {
        feed_timeline(timeline, feeds, speed, feeder_cancel.clone()).await;
        // One more cycle so the final estimates are reflected
        tokio::select! {
            _ = feeder_cancel.cancelled() => {}
            _ = tokio::time::sleep(cycle_interval + Duration::from_millis(50)) => {}
        }
        feeder_cancel.cancel();
    });

    let mut stats = ReplayStats::default();
    let mut show_placements = true;
    // Ends when the session returns and drops its event sender
    while let Some(event) = events_rx.recv().await {
        stats.record(&event);
        match event.kind() {
            // Placement tables only after the set or its quality changed
            EventKind::Placements if !show_placements => continue,
            EventKind::Placements => show_placements = false,
            EventKind::VisibilityChanged | EventKind::DegradedPlacement => show_placements = true,
            _ => {}
        }
        print_event(&event);
    }

    let session = session_task
        .await
        .map_err(|e| CliError::Session(e.to_string()))?;

    tracing::info!(cycles = stats.cycles, problems = stats.problems, "Replay finished");
    println!("{}", style("Replay complete").bold());
    Ok((session, stats))
}

/// Send every timeline entry on its stream, sleeping the recorded gaps
/// divided by `speed`. Dropping `feeds` at the end closes both streams.
async fn feed_timeline(
    timeline: Vec<(DateTime<Utc>, TraceEvent)>,
    feeds: SensorFeeds,
    speed: f64,
    cancel: CancellationToken,
) {
    let mut previous: Option<DateTime<Utc>> = None;

    for (at, event) in timeline {
        if let Some(prev) = previous {
            let gap = (at - prev).to_std().unwrap_or_default();
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(gap.div_f64(speed)) => {}
            }
        }
        previous = Some(at);

        let sent = match event {
            TraceEvent::Position(reading) => feeds.position.send(reading).await.is_ok(),
            TraceEvent::Orientation(reading) => feeds.orientation.send(reading).await.is_ok(),
        };
        if !sent {
            return;
        }
    }
}
