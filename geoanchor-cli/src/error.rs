//! CLI error types.

use std::fmt;
use std::path::PathBuf;

use geoanchor::catalog::CatalogError;
use geoanchor::config::ConfigError;
use geoanchor::logging::LoggingError;
use geoanchor::sensor::TraceError;

/// Errors surfaced to the user by `geoanchor` commands.
#[derive(Debug)]
pub enum CliError {
    /// Failed to load or save configuration.
    Config(ConfigError),

    /// Failed to list the object catalog.
    Catalog(CatalogError),

    /// Failed to load a recorded sensor trace.
    Trace { path: PathBuf, source: TraceError },

    /// Failed to install logging.
    Logging(LoggingError),

    /// A command-line value is out of range.
    InvalidArgument(String),

    /// Refusing to overwrite an existing config file.
    ConfigExists(PathBuf),

    /// Failed to create the Tokio runtime.
    Runtime(String),

    /// Failed to install the Ctrl+C handler.
    SignalHandler(String),

    /// The session task ended abnormally.
    Session(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Catalog(e) => write!(f, "Catalog error: {}", e),
            CliError::Trace { path, source } => {
                write!(f, "Failed to load trace {}: {}", path.display(), source)
            }
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::ConfigExists(path) => write!(
                f,
                "Config file already exists at {} (use --force to overwrite)",
                path.display()
            ),
            CliError::Runtime(msg) => write!(f, "Failed to create Tokio runtime: {}", msg),
            CliError::SignalHandler(msg) => {
                write!(f, "Failed to set signal handler: {}", msg)
            }
            CliError::Session(msg) => write!(f, "Session failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Catalog(e) => Some(e),
            CliError::Trace { source, .. } => Some(source),
            CliError::Logging(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<CatalogError> for CliError {
    fn from(e: CatalogError) -> Self {
        CliError::Catalog(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}
