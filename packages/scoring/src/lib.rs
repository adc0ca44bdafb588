#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Multi-criteria priority scoring over a fixed set of zones.
//!
//! Each criterion is measured per zone with a geometry-aware rule
//! ([`aggregate`]), rescaled onto `0..=100` relative to the corpus maximum
//! ([`normalize`]), combined with a validated weight vector ([`combine`]),
//! and mapped to an ordinal tier ([`classify`]). [`pipeline`] runs the
//! stages in order and [`stats`] summarizes the result.
//!
//! Any error aborts the whole run. Normalization is corpus-relative, so a
//! partially scored table would rank zones against the wrong maximum.

pub mod aggregate;
pub mod classify;
pub mod combine;
pub mod normalize;
pub mod pipeline;
pub mod stats;

use priority_map_scoring_models::ZoneId;
use thiserror::Error;

pub use classify::ClassificationBands;
pub use combine::CriterionWeights;
pub use pipeline::ScoringPipeline;

/// A violated configuration invariant. Detected before any result is
/// produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No criteria were configured.
    #[error("At least one criterion is required")]
    EmptyCriteria,

    /// Two criteria share a name.
    #[error("Duplicate criterion '{criterion}'")]
    DuplicateCriterion {
        /// The repeated name.
        criterion: String,
    },

    /// Criterion weights do not sum to `1.0`.
    #[error("Criterion weights must sum to 1.0 (tolerance {tolerance}), got {sum}")]
    WeightSum {
        /// Actual sum.
        sum: f64,
        /// Allowed deviation.
        tolerance: f64,
    },

    /// A weight, multiplier, or category weight is negative or not finite.
    #[error("Criterion '{criterion}': {field} must be a finite, non-negative number, got {value}")]
    InvalidWeight {
        /// Criterion name.
        criterion: String,
        /// Which weight (e.g. `"weight"`, `"sub_layers[1].criticality"`).
        field: String,
        /// Offending value.
        value: f64,
    },

    /// A multi-layer criterion has no sub-layers.
    #[error("Criterion '{criterion}': weighted_multi_layer needs at least one sub-layer")]
    EmptySubLayers {
        /// Criterion name.
        criterion: String,
    },

    /// A criterion references a feature layer that was not loaded.
    #[error("Criterion '{criterion}' references unknown layer '{layer}'")]
    UnknownLayer {
        /// Criterion name.
        criterion: String,
        /// Missing layer.
        layer: String,
    },

    /// A weighted criterion has no normalized scores at all.
    #[error("No normalized scores for weighted criterion '{criterion}'")]
    MissingCriterion {
        /// Criterion name.
        criterion: String,
    },

    /// A weighted criterion has no normalized score for a zone.
    #[error("Criterion '{criterion}' has no normalized score for zone {zone}")]
    MissingScore {
        /// Criterion name.
        criterion: String,
        /// Zone missing the score.
        zone: ZoneId,
    },

    /// Normalized scores were supplied for a criterion with no weight.
    #[error("Criterion '{criterion}' has scores but no weight")]
    MissingWeight {
        /// Criterion name.
        criterion: String,
    },

    /// No zones were supplied.
    #[error("At least one zone is required")]
    EmptyZones,

    /// Two zones share an id.
    #[error("Duplicate zone id {zone}")]
    DuplicateZone {
        /// The repeated id.
        zone: ZoneId,
    },

    /// No classification bands were configured.
    #[error("At least one classification band is required")]
    EmptyBands,

    /// A band has an empty label.
    #[error("Classification band {index} has an empty label")]
    EmptyLabel {
        /// Band position.
        index: usize,
    },

    /// Two bands share a label.
    #[error("Duplicate classification band label '{label}'")]
    DuplicateLabel {
        /// The repeated label.
        label: String,
    },

    /// A band's bounds are not finite or `lower >= upper`.
    #[error("Classification band '{label}' has empty or invalid range [{lower}, {upper})")]
    EmptyBand {
        /// Band label.
        label: String,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },

    /// The first band does not start at `0`.
    #[error("Classification bands must start at 0, first band starts at {lower}")]
    BandStart {
        /// Lower bound of the first band.
        lower: f64,
    },

    /// The last band does not end at `100`.
    #[error("Classification bands must end at 100, last band ends at {upper}")]
    BandEnd {
        /// Upper bound of the last band.
        upper: f64,
    },

    /// Consecutive bands leave part of the range unclassified.
    #[error("Gap between classification bands '{below}' and '{above}': [{from}, {to}) is unclassified")]
    BandGap {
        /// Label of the lower band.
        below: String,
        /// Label of the upper band.
        above: String,
        /// Start of the gap.
        from: f64,
        /// End of the gap.
        to: f64,
    },

    /// Consecutive bands classify part of the range twice.
    #[error("Classification bands '{below}' and '{above}' overlap on [{from}, {to})")]
    BandOverlap {
        /// Label of the lower band.
        below: String,
        /// Label of the upper band.
        above: String,
        /// Start of the overlap.
        from: f64,
        /// End of the overlap.
        to: f64,
    },
}

/// Invalid or unusable geometry met during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "zone {zone}{}: {reason}",
    geometry_context(.criterion.as_deref(), .layer.as_deref(), .feature.as_deref())
)]
pub struct GeometryError {
    /// Zone being scored.
    pub zone: ZoneId,
    /// Criterion being measured, if any.
    pub criterion: Option<String>,
    /// Feature layer, if a feature is at fault.
    pub layer: Option<String>,
    /// Feature id, if a feature is at fault.
    pub feature: Option<String>,
    /// What is wrong with it.
    pub reason: String,
}

fn geometry_context(
    criterion: Option<&str>,
    layer: Option<&str>,
    feature: Option<&str>,
) -> String {
    let mut context = String::new();
    if let Some(criterion) = criterion {
        context.push_str(&format!(", criterion '{criterion}'"));
    }
    if let Some(layer) = layer {
        context.push_str(&format!(", layer '{layer}'"));
    }
    if let Some(feature) = feature {
        context.push_str(&format!(", feature {feature}"));
    }
    context
}

/// Errors that abort a scoring run.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// Configuration invariant violated.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid input geometry.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// A feature attribute needed by a rule is missing or unusable.
    #[error(
        "Attribute error: zone {zone}, criterion '{criterion}', layer '{layer}', feature {feature}: attribute '{attribute}' {message}"
    )]
    Attribute {
        /// Zone being scored.
        zone: ZoneId,
        /// Criterion being measured.
        criterion: String,
        /// Feature layer.
        layer: String,
        /// Feature id.
        feature: String,
        /// Attribute name.
        attribute: String,
        /// What is wrong with the value.
        message: String,
    },

    /// A computed score escaped its contractual range. Indicates a bug.
    #[error("Internal consistency error: {message}")]
    InternalConsistency {
        /// Description of what went wrong.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_error_names_every_known_part() {
        let err = GeometryError {
            zone: ZoneId::from(4),
            criterion: Some("fuel".to_string()),
            layer: Some("stands".to_string()),
            feature: Some("stand-9".to_string()),
            reason: "feature geometry is invalid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "zone 4, criterion 'fuel', layer 'stands', feature stand-9: feature geometry is invalid"
        );
    }

    #[test]
    fn geometry_error_omits_missing_parts() {
        let err = GeometryError {
            zone: ZoneId::from("north"),
            criterion: None,
            layer: None,
            feature: None,
            reason: "zone geometry is invalid".to_string(),
        };
        assert_eq!(err.to_string(), "zone north: zone geometry is invalid");

        let wrapped = ScoringError::from(err);
        assert_eq!(
            wrapped.to_string(),
            "Geometry error: zone north: zone geometry is invalid"
        );
    }
}
