#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Criterion definitions, classification bands, and result types for the
//! zone priority scoring engine.
//!
//! These types carry no geometry. They describe how each criterion is
//! measured, how the final score is tiered, and what one scoring run
//! produces. The TOML analysis config deserializes directly into them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Lower bound of every normalized, priority, and band score.
pub const MIN_SCORE: f64 = 0.0;

/// Upper bound of every normalized, priority, and band score.
pub const MAX_SCORE: f64 = 100.0;

/// Allowed deviation of the criterion weight sum from `1.0`.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Slack allowed when range-checking scores against
/// [`MIN_SCORE`]..=[`MAX_SCORE`].
///
/// Weights may sum to `1.0 + WEIGHT_SUM_TOLERANCE`, so a zone at the
/// maximum of every criterion can land this far above `100`.
pub const SCORE_TOLERANCE: f64 = MAX_SCORE * WEIGHT_SUM_TOLERANCE;

/// Stable identifier of a zone.
///
/// Integer ids sort numerically and before string ids, so ranking
/// tie-breaks read naturally for numbered grid cells.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneId {
    /// Numeric id (grid cell number, parcel number).
    Int(i64),
    /// Textual id (GEOID, parcel APN).
    Text(String),
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for ZoneId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<i32> for ZoneId {
    fn from(id: i32) -> Self {
        Self::Int(i64::from(id))
    }
}

impl From<&str> for ZoneId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for ZoneId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

/// The kind of spatial aggregation a rule performs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AggregationMethod {
    /// Sum of an attribute over intersecting features.
    SumAttribute,
    /// Length of line features clipped to the zone.
    LengthCoverage,
    /// (Weighted) count of points inside or on the zone boundary.
    PointCount,
    /// Area of polygon features clipped to the zone.
    AreaOverlap,
    /// Weighted sum over nested sub-layer rules.
    WeightedMultiLayer,
}

/// How one criterion (or sub-layer) turns feature geometry into a raw
/// score for a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AggregationRule {
    /// Adds the full attribute value of every feature that overlaps the
    /// zone, regardless of how much of the feature lies inside. Lines and
    /// polygons that only share an edge or vertex with the zone add nothing;
    /// points on the boundary count.
    SumAttribute {
        /// Feature layer name.
        layer: String,
        /// Numeric property to sum.
        attribute: String,
    },
    /// Sums the length of the portion of each line feature inside the zone.
    LengthCoverage {
        /// Feature layer name.
        layer: String,
    },
    /// Counts point features inside or on the zone boundary.
    PointCount {
        /// Feature layer name.
        layer: String,
        /// Property holding each point's category, if categories are
        /// weighted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category_attribute: Option<String>,
        /// Weight per category value.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        category_weights: BTreeMap<String, f64>,
        /// Weight for points whose category is absent from
        /// `category_weights` (default `1.0`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_weight: Option<f64>,
    },
    /// Sums the area of each polygon feature clipped to the zone.
    AreaOverlap {
        /// Feature layer name.
        layer: String,
    },
    /// Weighted sum of nested rules, one per sub-layer.
    WeightedMultiLayer {
        /// Sub-layer configurations, summed in declaration order.
        sub_layers: Vec<SubLayer>,
    },
}

impl AggregationRule {
    /// Returns the aggregation method of this rule.
    #[must_use]
    pub const fn method(&self) -> AggregationMethod {
        match self {
            Self::SumAttribute { .. } => AggregationMethod::SumAttribute,
            Self::LengthCoverage { .. } => AggregationMethod::LengthCoverage,
            Self::PointCount { .. } => AggregationMethod::PointCount,
            Self::AreaOverlap { .. } => AggregationMethod::AreaOverlap,
            Self::WeightedMultiLayer { .. } => AggregationMethod::WeightedMultiLayer,
        }
    }

    /// Returns every feature layer name this rule reads, recursing into
    /// sub-layers, in declaration order.
    #[must_use]
    pub fn layers(&self) -> Vec<&str> {
        match self {
            Self::SumAttribute { layer, .. }
            | Self::LengthCoverage { layer }
            | Self::PointCount { layer, .. }
            | Self::AreaOverlap { layer } => vec![layer.as_str()],
            Self::WeightedMultiLayer { sub_layers } => sub_layers
                .iter()
                .flat_map(|sub| sub.rule.layers())
                .collect(),
        }
    }
}

const fn default_criticality() -> f64 {
    1.0
}

/// One branch of a [`AggregationRule::WeightedMultiLayer`] rule.
///
/// The sub-layer's contribution is `weight * criticality * raw`, where
/// `raw` comes from its own rule. `criticality` is the fixed multiplier
/// that separates, for example, transmission lines from distribution
/// circuits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubLayer {
    /// Human-readable sub-layer name (e.g. `"transmission"`).
    pub name: String,
    /// Weight of this sub-layer within the criterion.
    pub weight: f64,
    /// Fixed criticality multiplier (default `1.0`).
    #[serde(default = "default_criticality")]
    pub criticality: f64,
    /// How the sub-layer is measured.
    #[serde(flatten)]
    pub rule: AggregationRule,
}

/// A named, weighted criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDefinition {
    /// Unique criterion name (e.g. `"tree_mortality"`).
    pub name: String,
    /// Weight in the final combination. All weights must sum to `1.0`.
    pub weight: f64,
    /// How raw scores are measured.
    #[serde(flatten)]
    pub rule: AggregationRule,
}

/// A half-open score band `[lower, upper)` mapped to a tier label.
///
/// The topmost band of a partition is closed at [`MAX_SCORE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationBand {
    /// Inclusive lower bound.
    pub lower: f64,
    /// Exclusive upper bound (inclusive for the topmost band).
    pub upper: f64,
    /// Tier label (e.g. `"High"`).
    pub label: String,
}

impl ClassificationBand {
    /// Creates a band.
    #[must_use]
    pub fn new(lower: f64, upper: f64, label: impl Into<String>) -> Self {
        Self {
            lower,
            upper,
            label: label.into(),
        }
    }
}

/// Low `[0, 25)`, Medium `[25, 50)`, High `[50, 75)`, Critical `[75, 100]`.
#[must_use]
pub fn default_bands() -> Vec<ClassificationBand> {
    vec![
        ClassificationBand::new(0.0, 25.0, "Low"),
        ClassificationBand::new(25.0, 50.0, "Medium"),
        ClassificationBand::new(50.0, 75.0, "High"),
        ClassificationBand::new(75.0, 100.0, "Critical"),
    ]
}

/// Raw and normalized score of one zone for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionScore {
    /// Criterion name.
    pub criterion: String,
    /// Unnormalized measurement, in criterion-specific units.
    pub raw: f64,
    /// Raw score relative to the corpus maximum, in `[0, 100]`.
    pub normalized: f64,
}

/// The scoring outcome for one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    /// Zone identifier.
    pub zone_id: ZoneId,
    /// Per-criterion scores, in criterion declaration order.
    pub criteria: Vec<CriterionScore>,
    /// Weighted sum of normalized scores, in `[0, 100]` up to
    /// [`SCORE_TOLERANCE`]: weights summing to just over `1.0` may put a
    /// zone at the maximum of every criterion slightly above `100`. Scores
    /// are recorded as computed, never clamped.
    pub priority_score: f64,
    /// Tier label from the classification bands.
    pub tier: String,
}

impl ResultRecord {
    /// Looks up the score of a criterion by name.
    #[must_use]
    pub fn criterion(&self, name: &str) -> Option<&CriterionScore> {
        self.criteria.iter().find(|c| c.criterion == name)
    }
}

/// Number and share of zones in one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCount {
    /// Tier label.
    pub label: String,
    /// Zones in this tier.
    pub count: u64,
    /// `count / zone_count * 100`.
    pub percentage: f64,
}

/// A zone's position in the priority ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedZone {
    /// 1-based rank.
    pub rank: u64,
    /// Zone identifier.
    pub zone_id: ZoneId,
    /// Priority score.
    pub priority_score: f64,
    /// Tier label.
    pub tier: String,
}

/// Corpus-level figures for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionSummary {
    /// Criterion name.
    pub criterion: String,
    /// Weight in the final combination.
    pub weight: f64,
    /// Largest raw score (the normalization denominator).
    pub max_raw: f64,
    /// Mean raw score.
    pub mean_raw: f64,
    /// Mean normalized score.
    pub mean_normalized: f64,
    /// Zones with a raw score above zero.
    pub nonzero_zones: u64,
}

/// Summary statistics over one run's priority scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStatistics {
    /// Number of zones scored.
    pub zone_count: u64,
    /// Mean priority score.
    pub mean: f64,
    /// Sample standard deviation (`n - 1`), `0` for a single zone.
    pub std_dev: f64,
    /// Median priority score.
    pub median: f64,
    /// Lowest priority score.
    pub min: f64,
    /// Highest priority score.
    pub max: f64,
    /// Count and share per tier, in band order.
    pub tiers: Vec<TierCount>,
    /// Top zones by priority score, ties broken by ascending zone id.
    pub top_zones: Vec<RankedZone>,
    /// Per-criterion figures, in criterion declaration order.
    pub criteria: Vec<CriterionSummary>,
}

/// The full output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRun {
    /// One record per zone, sorted by zone id.
    pub records: Vec<ResultRecord>,
    /// Corpus-level statistics.
    pub summary: SummaryStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_ids_sort_integers_numerically_before_text() {
        let mut ids = vec![
            ZoneId::from("b"),
            ZoneId::from(10),
            ZoneId::from("a"),
            ZoneId::from(2),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                ZoneId::from(2),
                ZoneId::from(10),
                ZoneId::from("a"),
                ZoneId::from("b"),
            ]
        );
    }

    #[test]
    fn zone_id_deserializes_untagged() {
        let ids: Vec<ZoneId> = serde_json::from_str(r#"[7, "tract-1"]"#).unwrap();
        assert_eq!(ids, vec![ZoneId::from(7), ZoneId::from("tract-1")]);
    }

    #[test]
    fn default_bands_partition_score_range() {
        let bands = default_bands();
        assert!((bands[0].lower - MIN_SCORE).abs() < f64::EPSILON);
        assert!((bands[bands.len() - 1].upper - MAX_SCORE).abs() < f64::EPSILON);
        for pair in bands.windows(2) {
            assert!(
                (pair[0].upper - pair[1].lower).abs() < f64::EPSILON,
                "gap between {} and {}",
                pair[0].label,
                pair[1].label
            );
        }
    }

    #[test]
    fn criterion_parses_from_toml() {
        let criterion: CriterionDefinition = toml::de::from_str(
            r#"
            name = "utilities"
            weight = 0.25
            method = "weighted_multi_layer"

            [[sub_layers]]
            name = "transmission"
            weight = 0.7
            criticality = 3.0
            method = "length_coverage"
            layer = "transmission_lines"

            [[sub_layers]]
            name = "substations"
            weight = 0.3
            method = "point_count"
            layer = "substations"
            category_attribute = "voltage_class"
            category_weights = { high = 2.0, low = 0.5 }
            "#,
        )
        .unwrap();

        assert_eq!(criterion.rule.method(), AggregationMethod::WeightedMultiLayer);
        assert_eq!(
            criterion.rule.layers(),
            vec!["transmission_lines", "substations"]
        );

        let AggregationRule::WeightedMultiLayer { sub_layers } = &criterion.rule else {
            panic!("expected weighted_multi_layer, got {:?}", criterion.rule);
        };
        assert!((sub_layers[0].criticality - 3.0).abs() < f64::EPSILON);
        assert!((sub_layers[1].criticality - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let result: Result<CriterionDefinition, _> = toml::de::from_str(
            r#"
            name = "slope"
            weight = 1.0
            method = "raster_mean"
            layer = "dem"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn method_display_is_snake_case() {
        assert_eq!(AggregationMethod::AreaOverlap.to_string(), "area_overlap");
        assert_eq!(
            "point_count".parse::<AggregationMethod>().unwrap(),
            AggregationMethod::PointCount
        );
        assert_eq!(AggregationMethod::LengthCoverage.as_ref(), "length_coverage");
    }

    #[test]
    fn unknown_method_name_fails_to_parse() {
        assert_eq!(
            "kernel_density".parse::<AggregationMethod>(),
            Err(strum::ParseError::VariantNotFound)
        );
    }
}
