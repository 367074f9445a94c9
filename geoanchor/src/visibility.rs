//! Visibility-set membership tracking.
//!
//! Decides which anchored objects are close enough to render and reports how
//! that set changed since the previous cycle. Membership only ever changes
//! through the `entered` / `exited` lists returned by
//! [`VisibilitySetManager::update`].
//!
//! # State Machine (per object)
//!
//! ```text
//! Outside --[distance <= radius]--> Visible   (reported in `entered`)
//! Visible --[distance >  radius]--> Outside   (reported in `exited`)
//! Visible --[dropped from catalog]--> Outside (reported in `exited`)
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::catalog::{AnchorId, AnchoredObject, CatalogRecord, DataQualityIssue, DataQualityWarning};
use crate::geo::distance_meters;
use crate::tracking::SmoothedPosition;

/// Default radius within which objects are considered renderable.
pub const DEFAULT_VISIBILITY_RADIUS_METERS: f64 = 10.0;

/// Configuration for visibility tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityConfig {
    /// Inclusive visibility radius in meters.
    pub radius_meters: f64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            radius_meters: DEFAULT_VISIBILITY_RADIUS_METERS,
        }
    }
}

impl VisibilityConfig {
    pub fn with_radius(mut self, meters: f64) -> Self {
        self.radius_meters = meters;
        self
    }
}

/// An object that just became visible, with its distance at that moment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnteredObject {
    pub object: AnchoredObject,
    pub distance_meters: f64,
}

/// Result of one visibility cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityUpdate {
    /// Newly visible objects, closest first.
    pub entered: Vec<EnteredObject>,
    /// Ids that left the visible set, sorted by id.
    pub exited: Vec<AnchorId>,
    /// Catalog records skipped this cycle.
    pub warnings: Vec<DataQualityWarning>,
}

impl VisibilityUpdate {
    /// Whether the visible set changed.
    pub fn has_changes(&self) -> bool {
        !self.entered.is_empty() || !self.exited.is_empty()
    }
}

/// Tracks which anchored objects are within the visibility radius.
#[derive(Debug, Default)]
pub struct VisibilitySetManager {
    config: VisibilityConfig,
    /// Visible ids and their last computed distance.
    visible: BTreeMap<AnchorId, f64>,
}

impl VisibilitySetManager {
    /// Create a manager with default configuration.
    pub fn new() -> Self {
        Self::with_config(VisibilityConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: VisibilityConfig) -> Self {
        Self {
            config,
            visible: BTreeMap::new(),
        }
    }

    /// Recompute the visible set from a position and a catalog snapshot.
    ///
    /// Malformed records are skipped and reported as warnings. Calling this
    /// twice with the same inputs yields no transitions the second time.
    pub fn update(
        &mut self,
        position: &SmoothedPosition,
        catalog: &[CatalogRecord],
    ) -> VisibilityUpdate {
        let mut warnings = Vec::new();
        let mut seen: HashSet<&AnchorId> = HashSet::with_capacity(catalog.len());
        let mut candidates: BTreeMap<AnchorId, f64> = BTreeMap::new();
        let mut entered = Vec::new();

        for record in catalog {
            if seen.contains(&record.id) {
                tracing::warn!(id = %record.id, "Duplicate catalog id, keeping first record");
                warnings.push(DataQualityWarning {
                    id: record.id.clone(),
                    issue: DataQualityIssue::DuplicateId,
                });
                continue;
            }

            let object = match record.validate() {
                Ok(object) => object,
                Err(warning) => {
                    tracing::warn!(id = %warning.id, issue = %warning.issue, "Skipping catalog record");
                    warnings.push(warning);
                    continue;
                }
            };
            // Only a valid record claims its id
            seen.insert(&record.id);

            let distance = distance_meters(
                position.latitude,
                position.longitude,
                object.latitude,
                object.longitude,
            );
            if distance > self.config.radius_meters {
                continue;
            }

            if !self.visible.contains_key(&object.id) {
                entered.push(EnteredObject {
                    object: object.clone(),
                    distance_meters: distance,
                });
            }
            candidates.insert(object.id, distance);
        }

        let exited: Vec<AnchorId> = self
            .visible
            .keys()
            .filter(|id| !candidates.contains_key(*id))
            .cloned()
            .collect();

        entered.sort_by(|a, b| {
            a.distance_meters
                .partial_cmp(&b.distance_meters)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.object.id.cmp(&b.object.id))
        });

        for e in &entered {
            tracing::info!(id = %e.object.id, distance = e.distance_meters, "Object entered visibility radius");
        }
        for id in &exited {
            tracing::info!(id = %id, "Object left visibility radius");
        }

        self.visible = candidates;

        VisibilityUpdate {
            entered,
            exited,
            warnings,
        }
    }

    /// Visible ids in id order.
    pub fn visible_ids(&self) -> impl Iterator<Item = &AnchorId> {
        self.visible.keys()
    }

    /// Last computed distance of a visible object.
    pub fn distance_of(&self, id: &AnchorId) -> Option<f64> {
        self.visible.get(id).copied()
    }

    pub fn contains(&self, id: &AnchorId) -> bool {
        self.visible.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Drop every member, returning the removed ids in id order.
    ///
    /// The returned ids are exits the caller must report.
    pub fn clear(&mut self) -> Vec<AnchorId> {
        let exited: Vec<AnchorId> = std::mem::take(&mut self.visible).into_keys().collect();
        for id in &exited {
            tracing::info!(id = %id, "Object dropped from visible set");
        }
        exited
    }

    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }
}
