//! GeoAnchor CLI - Command-line interface
//!
//! Replays recorded sensor walks through the anchoring session and projects
//! catalog objects from a fixed pose.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use console::style;

use commands::project::ProjectArgs;
use commands::replay::ReplayArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "geoanchor")]
#[command(version, about = "Geo-anchored AR objects: sensor smoothing, visibility and projection", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay a recorded sensor trace through a live session
    Replay {
        /// Recorded trace (JSON with position, orientation and errors arrays)
        #[arg(long)]
        trace: PathBuf,

        /// Object catalog (JSON array of records)
        #[arg(long)]
        catalog: PathBuf,

        /// Config file (defaults to the user config if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },

    /// Place every visible object for a fixed pose
    Project {
        /// Latitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Compass heading in degrees; omitted means no orientation estimate
        #[arg(long, allow_negative_numbers = true)]
        heading: Option<f64>,

        /// Object catalog (JSON array of records)
        #[arg(long)]
        catalog: PathBuf,

        /// Config file (defaults to the user config if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination (defaults to the user config directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Replay {
            trace,
            catalog,
            config,
            speed,
        } => commands::replay::run(ReplayArgs {
            trace,
            catalog,
            config,
            speed,
            verbose: cli.verbose,
        }),
        Commands::Project {
            lat,
            lon,
            heading,
            catalog,
            config,
        } => commands::project::run(ProjectArgs {
            latitude: lat,
            longitude: lon,
            heading,
            catalog,
            config,
            verbose: cli.verbose,
        }),
        Commands::InitConfig { path, force } => commands::init_config::run(path, force),
    }
}
