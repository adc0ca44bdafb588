//! End-to-end scoring run.
//!
//! Stages run strictly in order: raw scores for every (zone, criterion)
//! pair, then per-criterion normalization, then weighted combination,
//! then classification and summary. Raw scoring is parallel across zones.
//! Normalization waits for all of it, since each criterion needs its
//! corpus maximum.

use std::collections::{BTreeMap, BTreeSet};

use priority_map_scoring_models::{
    AggregationRule, CriterionDefinition, CriterionScore, ResultRecord, ScoringRun, ZoneId,
};
use priority_map_spatial::{LayerSet, Zone};
use rayon::prelude::*;

use crate::{
    ClassificationBands, ConfigError, CriterionWeights, ScoringError, aggregate::aggregate,
    combine::combine, normalize::normalize, stats::summarize,
};

/// Default number of zones in the summary's top-N ranking.
pub const DEFAULT_TOP_N: usize = 10;

/// A validated scoring configuration that can be run against any zone set.
///
/// Running is a pure function of the zones and layers: the same inputs
/// always yield a bit-identical [`ScoringRun`].
#[derive(Debug, Clone)]
pub struct ScoringPipeline {
    criteria: Vec<CriterionDefinition>,
    weights: CriterionWeights,
    bands: ClassificationBands,
    top_n: usize,
}

impl ScoringPipeline {
    /// Validates criteria and bands.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the weights are invalid or do not sum to
    /// `1.0`, a multi-layer criterion has no sub-layers, or any sub-layer
    /// weight, criticality, or category weight is negative.
    pub fn new(
        criteria: Vec<CriterionDefinition>,
        bands: ClassificationBands,
    ) -> Result<Self, ConfigError> {
        let weights = CriterionWeights::from_criteria(&criteria)?;
        for criterion in &criteria {
            validate_rule(&criterion.name, "", &criterion.rule)?;
        }

        Ok(Self {
            criteria,
            weights,
            bands,
            top_n: DEFAULT_TOP_N,
        })
    }

    /// Sets how many zones the summary ranking lists.
    #[must_use]
    pub const fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Returns the criteria in summation order.
    #[must_use]
    pub fn criteria(&self) -> &[CriterionDefinition] {
        &self.criteria
    }

    /// Returns the classification bands.
    #[must_use]
    pub const fn bands(&self) -> &ClassificationBands {
        &self.bands
    }

    /// Checks that the zone set is non-empty with unique ids and that every
    /// referenced layer is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first problem found.
    pub fn validate_inputs(&self, zones: &[Zone], layers: &LayerSet) -> Result<(), ConfigError> {
        if zones.is_empty() {
            return Err(ConfigError::EmptyZones);
        }

        let mut seen = BTreeSet::new();
        for zone in zones {
            if !seen.insert(zone.id()) {
                return Err(ConfigError::DuplicateZone {
                    zone: zone.id().clone(),
                });
            }
        }

        for criterion in &self.criteria {
            if let Some(layer) = criterion
                .rule
                .layers()
                .into_iter()
                .find(|layer| !layers.contains(layer))
            {
                return Err(ConfigError::UnknownLayer {
                    criterion: criterion.name.clone(),
                    layer: layer.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Scores every zone and summarizes the result.
    ///
    /// Inputs are only read. On any error no result is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError`] for invalid inputs, invalid geometry or
    /// attributes, or any score escaping its range. When several zones
    /// fail, the error of the lowest zone id is reported.
    pub fn run(&self, zones: &[Zone], layers: &LayerSet) -> Result<ScoringRun, ScoringError> {
        self.validate_inputs(zones, layers)?;

        log::info!(
            "Scoring {} zones against {} criteria",
            zones.len(),
            self.criteria.len()
        );

        let mut ordered: Vec<&Zone> = zones.iter().collect();
        ordered.sort_by(|a, b| a.id().cmp(b.id()));

        let rows: Vec<Result<Vec<f64>, ScoringError>> = ordered
            .par_iter()
            .map(|zone| {
                self.criteria
                    .iter()
                    .map(|criterion| aggregate(zone, criterion, layers))
                    .collect()
            })
            .collect();

        let mut raw: BTreeMap<String, BTreeMap<ZoneId, f64>> = BTreeMap::new();
        for (zone, row) in ordered.iter().zip(rows) {
            for (criterion, value) in self.criteria.iter().zip(row?) {
                raw.entry(criterion.name.clone())
                    .or_default()
                    .insert(zone.id().clone(), value);
            }
        }

        let mut normalized = BTreeMap::new();
        for (criterion, scores) in &raw {
            log::debug!(
                "Criterion '{criterion}': max raw {}",
                crate::normalize::max_raw(scores)
            );
            normalized.insert(criterion.clone(), normalize(scores)?);
        }

        let priority = combine(&normalized, &self.weights)?;

        let records = ordered
            .iter()
            .map(|zone| self.record(zone.id(), &raw, &normalized, &priority))
            .collect::<Result<Vec<_>, _>>()?;

        let summary = summarize(&records, &self.criteria, &self.bands, self.top_n);
        for tier in &summary.tiers {
            log::info!(
                "{}: {} zones ({:.1}%)",
                tier.label,
                tier.count,
                tier.percentage
            );
        }

        Ok(ScoringRun { records, summary })
    }

    fn record(
        &self,
        zone: &ZoneId,
        raw: &BTreeMap<String, BTreeMap<ZoneId, f64>>,
        normalized: &BTreeMap<String, BTreeMap<ZoneId, f64>>,
        priority: &BTreeMap<ZoneId, f64>,
    ) -> Result<ResultRecord, ScoringError> {
        let missing = |stage: &str| ScoringError::InternalConsistency {
            message: format!("zone {zone} has no {stage} score"),
        };

        let criteria = self
            .criteria
            .iter()
            .map(|criterion| {
                let lookup = |table: &BTreeMap<String, BTreeMap<ZoneId, f64>>| {
                    table
                        .get(&criterion.name)
                        .and_then(|scores| scores.get(zone))
                        .copied()
                };
                Ok(CriterionScore {
                    criterion: criterion.name.clone(),
                    raw: lookup(raw).ok_or_else(|| missing("raw"))?,
                    normalized: lookup(normalized).ok_or_else(|| missing("normalized"))?,
                })
            })
            .collect::<Result<Vec<_>, ScoringError>>()?;

        let priority_score = priority
            .get(zone)
            .copied()
            .ok_or_else(|| missing("priority"))?;
        let tier = self.bands.classify(priority_score)?.to_string();

        Ok(ResultRecord {
            zone_id: zone.clone(),
            criteria,
            priority_score,
            tier,
        })
    }
}

fn validate_rule(criterion: &str, path: &str, rule: &AggregationRule) -> Result<(), ConfigError> {
    let non_negative = |field: String, value: f64| {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(ConfigError::InvalidWeight {
                criterion: criterion.to_string(),
                field,
                value,
            })
        }
    };

    match rule {
        AggregationRule::SumAttribute { .. }
        | AggregationRule::LengthCoverage { .. }
        | AggregationRule::AreaOverlap { .. } => Ok(()),
        AggregationRule::PointCount {
            category_weights,
            default_weight,
            ..
        } => {
            for (category, weight) in category_weights {
                non_negative(format!("{path}category_weights.{category}"), *weight)?;
            }
            if let Some(weight) = default_weight {
                non_negative(format!("{path}default_weight"), *weight)?;
            }
            Ok(())
        }
        AggregationRule::WeightedMultiLayer { sub_layers } => {
            if sub_layers.is_empty() {
                return Err(ConfigError::EmptySubLayers {
                    criterion: criterion.to_string(),
                });
            }
            for (index, sub) in sub_layers.iter().enumerate() {
                let prefix = format!("{path}sub_layers[{index}].");
                non_negative(format!("{prefix}weight"), sub.weight)?;
                non_negative(format!("{prefix}criticality"), sub.criticality)?;
                validate_rule(criterion, &prefix, &sub.rule)?;
            }
            Ok(())
        }
    }
}
