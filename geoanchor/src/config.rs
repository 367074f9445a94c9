//! Configuration file support.
//!
//! All tuning lives in a single INI file, by default at
//! `~/.config/geoanchor/config.ini`. Missing sections and keys keep their
//! defaults and unknown keys are ignored, so a partial file is always valid.
//!
//! ```ini
//! [position]
//! history_capacity = 5
//! max_accuracy_meters = 100
//! recency_factor = 0.7
//!
//! [visibility]
//! radius_meters = 10
//! ```

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::logging::LoggingConfig;
use crate::projection::ProjectorConfig;
use crate::session::SessionConfig;
use crate::tracking::{OrientationTrackerConfig, PositionTrackerConfig};
use crate::visibility::VisibilityConfig;

/// Name of the configuration directory under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "geoanchor";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    #[error("Invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Could not determine the user config directory")]
    NoConfigDir,
}

/// Complete configuration of an anchoring session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchoringConfig {
    pub position: PositionTrackerConfig,
    pub orientation: OrientationTrackerConfig,
    pub visibility: VisibilityConfig,
    pub projection: ProjectorConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Default location of the config file.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

impl AnchoringConfig {
    /// Load from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ini_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from `path` if given, otherwise from the default location when
    /// it exists, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Ok(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parse INI text, starting from defaults.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("position")) {
            let reader = SectionReader::new("position", section);
            let position = &mut config.position;
            reader.read("history_capacity", &mut position.history_capacity)?;
            reader.read("max_accuracy_meters", &mut position.max_accuracy_meters)?;
            reader.read("recency_factor", &mut position.recency_factor)?;
        }

        if let Some(section) = ini.section(Some("orientation")) {
            let reader = SectionReader::new("orientation", section);
            let orientation = &mut config.orientation;
            reader.read("history_capacity", &mut orientation.history_capacity)?;
            reader.read("recency_factor", &mut orientation.recency_factor)?;
            reader.read(
                "min_angular_delta_degrees",
                &mut orientation.min_angular_delta_degrees,
            )?;
        }

        if let Some(section) = ini.section(Some("visibility")) {
            let reader = SectionReader::new("visibility", section);
            reader.read("radius_meters", &mut config.visibility.radius_meters)?;
        }

        if let Some(section) = ini.section(Some("projection")) {
            let reader = SectionReader::new("projection", section);
            let projection = &mut config.projection;
            reader.read(
                "max_render_distance_meters",
                &mut projection.max_render_distance_meters,
            )?;
            reader.read(
                "fallback_distance_meters",
                &mut projection.fallback_distance_meters,
            )?;
        }

        if let Some(section) = ini.section(Some("session")) {
            let reader = SectionReader::new("session", section);
            let mut millis = config.session.cycle_interval.as_millis() as u64;
            reader.read("cycle_interval_ms", &mut millis)?;
            config.session.cycle_interval = Duration::from_millis(millis);
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(level) = section.get("level").map(str::trim) {
                if !level.is_empty() {
                    config.logging.level = level.to_string();
                }
            }
            config.logging.file = section
                .get("file")
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(PathBuf::from);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_capacity("position", self.position.history_capacity)?;
        check_recency("position", self.position.recency_factor)?;
        check_positive(
            "position",
            "max_accuracy_meters",
            self.position.max_accuracy_meters,
        )?;

        check_capacity("orientation", self.orientation.history_capacity)?;
        check_recency("orientation", self.orientation.recency_factor)?;
        check_non_negative(
            "orientation",
            "min_angular_delta_degrees",
            self.orientation.min_angular_delta_degrees,
        )?;

        check_non_negative("visibility", "radius_meters", self.visibility.radius_meters)?;

        check_positive(
            "projection",
            "max_render_distance_meters",
            self.projection.max_render_distance_meters,
        )?;
        check_non_negative(
            "projection",
            "fallback_distance_meters",
            self.projection.fallback_distance_meters,
        )?;

        if self.session.cycle_interval.is_zero() {
            return Err(invalid("session", "cycle_interval_ms", 0, "must be positive"));
        }

        Ok(())
    }

    /// Render as INI text, every key present.
    pub fn to_ini(&self) -> String {
        let mut ini = Ini::new();
        ini.with_section(Some("position"))
            .set("history_capacity", self.position.history_capacity.to_string())
            .set(
                "max_accuracy_meters",
                self.position.max_accuracy_meters.to_string(),
            )
            .set("recency_factor", self.position.recency_factor.to_string());
        ini.with_section(Some("orientation"))
            .set(
                "history_capacity",
                self.orientation.history_capacity.to_string(),
            )
            .set("recency_factor", self.orientation.recency_factor.to_string())
            .set(
                "min_angular_delta_degrees",
                self.orientation.min_angular_delta_degrees.to_string(),
            );
        ini.with_section(Some("visibility"))
            .set("radius_meters", self.visibility.radius_meters.to_string());
        ini.with_section(Some("projection"))
            .set(
                "max_render_distance_meters",
                self.projection.max_render_distance_meters.to_string(),
            )
            .set(
                "fallback_distance_meters",
                self.projection.fallback_distance_meters.to_string(),
            );
        ini.with_section(Some("session")).set(
            "cycle_interval_ms",
            self.session.cycle_interval.as_millis().to_string(),
        );
        ini.with_section(Some("logging"))
            .set("level", self.logging.level.clone())
            .set(
                "file",
                self.logging
                    .file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            );

        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = ini.write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.to_ini()).map_err(io_err)?;
        tracing::info!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}

/// Typed reads from one INI section.
struct SectionReader<'a> {
    name: &'static str,
    properties: &'a Properties,
}

impl<'a> SectionReader<'a> {
    fn new(name: &'static str, properties: &'a Properties) -> Self {
        Self { name, properties }
    }

    /// Overwrite `target` when the key is present and non-empty.
    fn read<T>(&self, key: &str, target: &mut T) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(raw) = self.properties.get(key).map(str::trim) else {
            return Ok(());
        };
        if raw.is_empty() {
            return Ok(());
        }
        *target = raw
            .parse()
            .map_err(|e: T::Err| invalid(self.name, key, raw, e))?;
        Ok(())
    }
}

fn invalid(section: &str, key: &str, value: impl Display, reason: impl Display) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn check_capacity(section: &str, capacity: usize) -> Result<(), ConfigError> {
    if capacity == 0 {
        return Err(invalid(section, "history_capacity", capacity, "must be at least 1"));
    }
    Ok(())
}

fn check_recency(section: &str, factor: f64) -> Result<(), ConfigError> {
    if !(factor > 0.0 && factor < 1.0) {
        return Err(invalid(section, "recency_factor", factor, "must be in (0, 1)"));
    }
    Ok(())
}

fn check_positive(section: &str, key: &str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(section, key, value, "must be a positive number"));
    }
    Ok(())
}

fn check_non_negative(section: &str, key: &str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(invalid(section, key, value, "must not be negative"));
    }
    Ok(())
}
