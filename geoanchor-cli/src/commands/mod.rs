//! Command handlers.

pub mod init_config;
pub mod output;
pub mod project;
pub mod replay;

use std::path::Path;

use geoanchor::config::AnchoringConfig;
use geoanchor::logging::{init_logging, WorkerGuard};

use crate::error::CliError;

/// Load the config and install logging, with `--verbose` forcing `debug`.
///
/// The returned guard must outlive the command.
pub fn prepare(
    config_path: Option<&Path>,
    verbose: bool,
) -> Result<(AnchoringConfig, Option<WorkerGuard>), CliError> {
    let config = AnchoringConfig::load_or_default(config_path)?;

    let mut logging = config.logging.clone();
    if verbose {
        logging.level = "debug".to_string();
    }
    let guard = init_logging(&logging)?;

    tracing::debug!(config = ?config_path, "Configuration loaded");
    Ok((config, guard))
}
