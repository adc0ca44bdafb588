#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Zone and feature-layer geometry for priority scoring.
//!
//! Zones are the polygons being ranked. Feature layers hold the geometry
//! each criterion measures (mortality polygons, evacuation routes,
//! substations) and are bulk-loaded into R-tree indexes so that every
//! zone only tests features whose bounding box touches its own.

pub mod geojson_io;

use std::collections::BTreeMap;

use geo::{BoundingRect, Geometry, MultiPolygon, Validation};
use priority_map_scoring_models::ZoneId;
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Feature attributes, as carried by `GeoJSON` properties.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Errors that can occur while building zones and feature layers.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// `GeoJSON` parsing or geometry conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The `GeoJSON` document is not a feature or feature collection.
    #[error("Unsupported GeoJSON root: expected a Feature or FeatureCollection")]
    UnsupportedRoot,

    /// A feature has no geometry.
    #[error("Feature {index} has no geometry")]
    MissingGeometry {
        /// Position of the feature in its collection.
        index: usize,
    },

    /// A zone feature has no usable identifier.
    #[error("Zone feature {index} has no id: {message}")]
    MissingZoneId {
        /// Position of the feature in its collection.
        index: usize,
        /// What was looked up.
        message: String,
    },

    /// Two zones share an identifier.
    #[error("Duplicate zone id {id}")]
    DuplicateZone {
        /// The repeated id.
        id: ZoneId,
    },

    /// A zone geometry is not a polygon or multipolygon.
    #[error("Zone {id} geometry is not a Polygon or MultiPolygon")]
    NonPolygonalZone {
        /// Zone identifier.
        id: ZoneId,
    },

    /// A feature geometry has no extent, so it cannot be indexed.
    #[error("Feature {feature} in layer {layer} has empty geometry")]
    EmptyGeometry {
        /// Layer name.
        layer: String,
        /// Feature identifier.
        feature: String,
    },
}

/// A polygonal spatial unit being ranked.
#[derive(Debug, Clone)]
pub struct Zone {
    id: ZoneId,
    geometry: MultiPolygon<f64>,
}

impl Zone {
    /// Creates a zone.
    #[must_use]
    pub const fn new(id: ZoneId, geometry: MultiPolygon<f64>) -> Self {
        Self { id, geometry }
    }

    /// Returns the zone identifier.
    #[must_use]
    pub const fn id(&self) -> &ZoneId {
        &self.id
    }

    /// Returns the zone polygon(s).
    #[must_use]
    pub const fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Returns the bounding box used to query feature layers, or `None`
    /// for an empty zone.
    #[must_use]
    pub fn envelope(&self) -> Option<AABB<[f64; 2]>> {
        self.geometry.bounding_rect().map(|rect| {
            AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
        })
    }

    /// Returns `true` if the zone geometry is valid (closed rings, no
    /// self-intersection, non-degenerate).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.geometry.0.is_empty() && self.geometry.is_valid()
    }
}

/// A single source feature: geometry plus optional attributes.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Identifier used in diagnostics.
    pub id: String,
    /// Geometry in the same spatial reference as the zones.
    pub geometry: Geometry<f64>,
    /// Attribute values.
    pub properties: Properties,
}

impl Feature {
    /// Creates a feature without attributes.
    #[must_use]
    pub fn new(id: impl Into<String>, geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            id: id.into(),
            geometry: geometry.into(),
            properties: Properties::new(),
        }
    }

    /// Adds an attribute, builder style.
    #[must_use]
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the raw attribute value, treating JSON `null` as absent.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key).filter(|v| !v.is_null())
    }

    /// Reads an attribute as a number. Numeric strings are accepted since
    /// shapefile-derived `GeoJSON` often stores numbers as text.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.attribute(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Reads an attribute as a category label.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        match self.attribute(key)? {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// A feature's bounding box stored in the R-tree, pointing back at the
/// feature's position in its layer.
struct FeatureEntry {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A feature returned by an envelope query.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// The feature.
    pub feature: &'a Feature,
    /// Whether the feature geometry passed validation.
    pub valid: bool,
}

/// A named collection of features with an R-tree over their bounding
/// boxes.
///
/// Built once per run and shared read-only by all scoring workers.
pub struct FeatureLayer {
    name: String,
    features: Vec<Feature>,
    validity: Vec<bool>,
    index: RTree<FeatureEntry>,
}

impl std::fmt::Debug for FeatureLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureLayer")
            .field("name", &self.name)
            .field("features", &self.features.len())
            .finish_non_exhaustive()
    }
}

impl FeatureLayer {
    /// Validates and indexes a layer's features.
    ///
    /// Invalid geometries are kept and flagged rather than dropped, so
    /// scoring can report them against the zone they touch.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyGeometry`] if a feature has no extent.
    pub fn new(name: impl Into<String>, features: Vec<Feature>) -> Result<Self, SpatialError> {
        let name = name.into();
        let mut entries = Vec::with_capacity(features.len());
        let mut validity = Vec::with_capacity(features.len());

        for (position, feature) in features.iter().enumerate() {
            let Some(rect) = feature.geometry.bounding_rect() else {
                return Err(SpatialError::EmptyGeometry {
                    layer: name,
                    feature: feature.id.clone(),
                });
            };

            let valid = feature.geometry.is_valid();
            if !valid {
                log::warn!("Feature {} in layer {name} has invalid geometry", feature.id);
            }
            validity.push(valid);

            entries.push(FeatureEntry {
                position,
                envelope: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            });
        }

        log::debug!("Indexed {} features in layer {name}", features.len());

        Ok(Self {
            name,
            features,
            validity,
            index: RTree::bulk_load(entries),
        })
    }

    /// Returns the layer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Returns all features in load order.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Returns features whose bounding box intersects `envelope`, in load
    /// order so that downstream sums are reproducible.
    #[must_use]
    pub fn candidates(&self, envelope: &AABB<[f64; 2]>) -> Vec<Candidate<'_>> {
        let mut positions: Vec<usize> = self
            .index
            .locate_in_envelope_intersecting(envelope)
            .map(|entry| entry.position)
            .collect();
        positions.sort_unstable();

        positions
            .into_iter()
            .filter_map(|position| {
                Some(Candidate {
                    feature: self.features.get(position)?,
                    valid: self.validity.get(position).copied().unwrap_or(false),
                })
            })
            .collect()
    }
}

/// All feature layers of a run, keyed by name.
#[derive(Debug, Default)]
pub struct LayerSet {
    layers: BTreeMap<String, FeatureLayer>,
}

impl LayerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer, replacing any layer with the same name.
    pub fn insert(&mut self, layer: FeatureLayer) {
        self.layers.insert(layer.name.clone(), layer);
    }

    /// Looks up a layer by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FeatureLayer> {
        self.layers.get(name)
    }

    /// Returns `true` if a layer with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Iterates layer names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }
}

impl FromIterator<FeatureLayer> for LayerSet {
    fn from_iter<I: IntoIterator<Item = FeatureLayer>>(iter: I) -> Self {
        let mut set = Self::new();
        for layer in iter {
            set.insert(layer);
        }
        set
    }
}
