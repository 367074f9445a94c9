//! Project command - one visibility cycle from a fixed pose.

use std::path::PathBuf;

use console::style;
use geoanchor::catalog::{AnchorCatalog, CatalogRecord, JsonFileCatalog};
use geoanchor::config::AnchoringConfig;
use geoanchor::sensor::{OrientationSample, PositionSample};
use geoanchor::session::{AnchoringSession, CycleReport};

use super::output::print_placements;
use crate::error::CliError;

/// Arguments for the project command.
pub struct ProjectArgs {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: Option<f64>,
    pub catalog: PathBuf,
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

/// Run the project command.
pub fn run(args: ProjectArgs) -> Result<(), CliError> {
    let (config, _guard) = super::prepare(args.config.as_deref(), args.verbose)?;

    let records = JsonFileCatalog::new(&args.catalog).list_anchored_objects()?;
    let report = project_from_pose(&config, &records, args.latitude, args.longitude, args.heading)?;

    println!(
        "Pose: ({:.6}, {:.6}) heading {}",
        args.latitude,
        args.longitude,
        args.heading
            .map(|h| format!("{:.1}°", h))
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!(
        "Catalog: {} records, visibility radius {} m",
        records.len(),
        config.visibility.radius_meters
    );
    println!();

    for warning in &report.visibility.warnings {
        println!("{} {}", style("warning:").yellow().bold(), warning);
    }

    if report.placements.is_empty() {
        println!("No objects within range.");
    } else {
        println!("{} visible:", report.placements.len());
        print_placements(&report.placements);
    }
    Ok(())
}

/// Feed a single fix and optional heading into a fresh session and run one
/// cycle.
pub fn project_from_pose(
    config: &AnchoringConfig,
    records: &[CatalogRecord],
    latitude: f64,
    longitude: f64,
    heading: Option<f64>,
) -> Result<CycleReport, CliError> {
    let mut session = AnchoringSession::new(config);

    session
        .ingest_position(PositionSample::new(latitude, longitude, 0.0))
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
    if let Some(heading) = heading {
        session
            .ingest_orientation(OrientationSample::new(heading, 0.0, 0.0))
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
    }

    session
        .run_cycle(records)
        .ok_or_else(|| CliError::InvalidArgument("position was not accepted".to_string()))
}
