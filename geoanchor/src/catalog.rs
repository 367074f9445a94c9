//! Anchored-object catalog boundary.
//!
//! The object store is an external collaborator. It hands out loosely shaped
//! [`CatalogRecord`]s; this module validates them into closed
//! [`AnchoredObject`]s before any geometry runs, and flags anything malformed
//! as a [`DataQualityWarning`] instead of failing.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::GeoPoint;

/// Opaque, unique identifier of an anchored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(String);

impl AnchorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnchorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AnchorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A catalog entry as stored, before validation.
///
/// Coordinates are optional because stores in the wild contain half-written
/// records. Heading and scale fall back to `0°` and `1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: AnchorId,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub heading_degrees: Option<f64>,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub model_reference: String,
    /// Set when the stored entry could not be decoded into this shape.
    #[serde(skip)]
    pub malformed: Option<String>,
}

impl CatalogRecord {
    /// A fully populated record.
    pub fn new(
        id: impl Into<AnchorId>,
        latitude: f64,
        longitude: f64,
        model_reference: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            heading_degrees: None,
            scale: None,
            model_reference: model_reference.into(),
            malformed: None,
        }
    }

    /// Placeholder for a stored entry that did not decode.
    ///
    /// Validation always rejects it with [`DataQualityIssue::Malformed`].
    pub fn malformed(id: impl Into<AnchorId>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            latitude: None,
            longitude: None,
            heading_degrees: None,
            scale: None,
            model_reference: String::new(),
            malformed: Some(reason.into()),
        }
    }

    /// Decode one element of a stored JSON array.
    ///
    /// An element that does not fit the record shape becomes a
    /// [`malformed`](Self::malformed) record keyed by its `id` when it has a
    /// string one, or by `#<index>` otherwise.
    pub fn from_json_value(index: usize, value: serde_json::Value) -> Self {
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(AnchorId::new)
            .unwrap_or_else(|| AnchorId::new(format!("#{}", index)));

        match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => Self::malformed(id, e.to_string()),
        }
    }

    /// Set the placement heading.
    pub fn with_heading(mut self, degrees: f64) -> Self {
        self.heading_degrees = Some(degrees);
        self
    }

    /// Set the render scale.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Validate into an [`AnchoredObject`].
    pub fn validate(&self) -> Result<AnchoredObject, DataQualityWarning> {
        let warn = |issue| DataQualityWarning {
            id: self.id.clone(),
            issue,
        };

        if let Some(reason) = &self.malformed {
            return Err(warn(DataQualityIssue::Malformed(reason.clone())));
        }

        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            return Err(warn(DataQualityIssue::MissingCoordinates));
        };

        let point = GeoPoint::new(latitude, longitude);
        if !point.is_valid() {
            return Err(warn(DataQualityIssue::InvalidCoordinates {
                latitude,
                longitude,
            }));
        }

        let heading_degrees = self.heading_degrees.unwrap_or(0.0);
        if !heading_degrees.is_finite() {
            return Err(warn(DataQualityIssue::InvalidHeading(heading_degrees)));
        }

        let scale = self.scale.unwrap_or(1.0);
        if !scale.is_finite() || scale <= 0.0 {
            return Err(warn(DataQualityIssue::InvalidScale(scale)));
        }

        Ok(AnchoredObject {
            id: self.id.clone(),
            latitude,
            longitude,
            heading_degrees,
            scale,
            model_reference: self.model_reference.clone(),
        })
    }
}

/// A validated, read-only anchored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchoredObject {
    pub id: AnchorId,
    pub latitude: f64,
    pub longitude: f64,
    /// Compass heading recorded when the object was placed.
    pub heading_degrees: f64,
    pub scale: f64,
    /// Opaque handle the renderer uses to load the model.
    pub model_reference: String,
}

impl AnchoredObject {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// What is wrong with a skipped catalog record.
#[derive(Debug, Clone, PartialEq)]
pub enum DataQualityIssue {
    /// The stored entry does not have the record shape at all.
    Malformed(String),
    /// Latitude or longitude is absent.
    MissingCoordinates,
    /// Coordinates are non-finite or outside WGS-84 ranges.
    InvalidCoordinates { latitude: f64, longitude: f64 },
    /// Placement heading is not finite.
    InvalidHeading(f64),
    /// Scale is non-finite or not positive.
    InvalidScale(f64),
    /// Another record in the same snapshot already used this id.
    DuplicateId,
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityIssue::Malformed(reason) => write!(f, "malformed record: {}", reason),
            DataQualityIssue::MissingCoordinates => write!(f, "missing coordinates"),
            DataQualityIssue::InvalidCoordinates {
                latitude,
                longitude,
            } => write!(f, "invalid coordinates ({}, {})", latitude, longitude),
            DataQualityIssue::InvalidHeading(h) => write!(f, "invalid heading {}", h),
            DataQualityIssue::InvalidScale(s) => write!(f, "invalid scale {}", s),
            DataQualityIssue::DuplicateId => write!(f, "duplicate id"),
        }
    }
}

/// A catalog record that was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct DataQualityWarning {
    pub id: AnchorId,
    pub issue: DataQualityIssue,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Catalog record '{}' skipped: {}", self.id, self.issue)
    }
}

/// Errors listing the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed catalog {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only listing contract of the object store.
///
/// Called at most once per visibility cycle; each call returns a fresh
/// snapshot.
pub trait AnchorCatalog: Send + Sync {
    /// List every anchored object currently stored.
    fn list_anchored_objects(&self) -> Result<Vec<CatalogRecord>, CatalogError>;
}

/// Catalog held in memory, replaceable while a session runs.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: RwLock<Vec<CatalogRecord>>,
}

impl InMemoryCatalog {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Swap in a new snapshot.
    pub fn replace(&self, records: Vec<CatalogRecord>) {
        *self.records.write() = records;
    }

    /// Add or overwrite a single record.
    pub fn upsert(&self, record: CatalogRecord) {
        let mut records = self.records.write();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    /// Remove a record, returning whether it existed.
    pub fn remove(&self, id: &AnchorId) -> bool {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| &r.id != id);
        records.len() != before
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl AnchorCatalog for InMemoryCatalog {
    fn list_anchored_objects(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        Ok(self.records.read().clone())
    }
}

/// Catalog backed by a JSON array of records on disk, re-read on every listing.
///
/// Only an unreadable file or a top level that is not an array fails the
/// listing. Individual elements are decoded one by one.
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AnchorCatalog for JsonFileCatalog {
    fn list_anchored_objects(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        let json = fs::read_to_string(&self.path).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })?;
        let values: Vec<serde_json::Value> =
            serde_json::from_str(&json).map_err(|source| CatalogError::Json {
                path: self.path.clone(),
                source,
            })?;

        Ok(values
            .into_iter()
            .enumerate()
            .map(|(index, value)| CatalogRecord::from_json_value(index, value))
            .collect())
    }
}
