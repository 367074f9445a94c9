//! Init-config command - write a default configuration file.

use std::path::{Path, PathBuf};

use geoanchor::config::{default_config_path, AnchoringConfig};

use crate::error::CliError;

/// Run the init-config command.
pub fn run(path: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    write_default_config(&path, force)?;

    println!("Configuration file: {}", path.display());
    println!();
    println!("Edit this file to tune smoothing, visibility radius and projection.");
    println!("Pass it to replay or project with --config.");
    Ok(())
}

/// Write the default configuration unless a file already exists.
pub fn write_default_config(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::ConfigExists(path.to_path_buf()));
    }
    AnchoringConfig::default().save(path)?;
    Ok(())
}
