//! Weighted combination of normalized criterion scores.
//!
//! Criteria are summed in weight declaration order, always. Floating-point
//! addition is not associative, so a fixed order is what keeps priority
//! scores bit-identical across runs.

use std::collections::{BTreeMap, BTreeSet};

use priority_map_scoring_models::{
    CriterionDefinition, MAX_SCORE, MIN_SCORE, SCORE_TOLERANCE, WEIGHT_SUM_TOLERANCE, ZoneId,
};

use crate::{ConfigError, ScoringError};

/// A validated, ordered weight vector: non-negative weights summing to
/// `1.0` within [`WEIGHT_SUM_TOLERANCE`].
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionWeights {
    weights: Vec<(String, f64)>,
}

impl CriterionWeights {
    /// Validates a weight vector.
    ///
    /// Weights are never renormalized; a bad sum is a configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the vector is empty, names a criterion
    /// twice, holds a negative or non-finite weight, or does not sum to
    /// `1.0`.
    pub fn new(weights: Vec<(String, f64)>) -> Result<Self, ConfigError> {
        if weights.is_empty() {
            return Err(ConfigError::EmptyCriteria);
        }

        let mut seen = BTreeSet::new();
        for (criterion, weight) in &weights {
            if !seen.insert(criterion.as_str()) {
                return Err(ConfigError::DuplicateCriterion {
                    criterion: criterion.clone(),
                });
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    criterion: criterion.clone(),
                    field: "weight".to_string(),
                    value: *weight,
                });
            }
        }

        let sum: f64 = weights.iter().map(|(_, weight)| weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum {
                sum,
                tolerance: WEIGHT_SUM_TOLERANCE,
            });
        }

        Ok(Self { weights })
    }

    /// Collects and validates the weights of a criterion list, keeping its
    /// order.
    ///
    /// # Errors
    ///
    /// See [`CriterionWeights::new`].
    pub fn from_criteria(criteria: &[CriterionDefinition]) -> Result<Self, ConfigError> {
        Self::new(
            criteria
                .iter()
                .map(|criterion| (criterion.name.clone(), criterion.weight))
                .collect(),
        )
    }

    /// Iterates `(criterion, weight)` pairs in summation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights
            .iter()
            .map(|(criterion, weight)| (criterion.as_str(), *weight))
    }

    /// Looks up one criterion's weight.
    #[must_use]
    pub fn get(&self, criterion: &str) -> Option<f64> {
        self.iter()
            .find(|(name, _)| *name == criterion)
            .map(|(_, weight)| weight)
    }

    /// Sum of all weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.weights.iter().map(|(_, weight)| weight).sum()
    }
}

/// Combines normalized scores into one priority score per zone.
///
/// `priority[zone] = Σ weight[criterion] × normalized[criterion][zone]`,
/// summed in the order of `weights`. The zone set is every zone that has
/// a score for any criterion.
///
/// # Errors
///
/// * [`ConfigError::MissingCriterion`] / [`ConfigError::MissingScore`] if
///   a weighted criterion lacks scores entirely or for some zone. Missing
///   scores are never treated as `0`.
/// * [`ConfigError::MissingWeight`] if scores exist for an unweighted
///   criterion.
/// * [`ScoringError::InternalConsistency`] if a result leaves `0..=100`.
pub fn combine(
    normalized: &BTreeMap<String, BTreeMap<ZoneId, f64>>,
    weights: &CriterionWeights,
) -> Result<BTreeMap<ZoneId, f64>, ScoringError> {
    if let Some(criterion) = normalized.keys().find(|c| weights.get(c).is_none()) {
        return Err(ConfigError::MissingWeight {
            criterion: criterion.clone(),
        }
        .into());
    }

    let zones: BTreeSet<&ZoneId> = normalized.values().flat_map(BTreeMap::keys).collect();

    let mut columns = Vec::with_capacity(weights.weights.len());
    for (criterion, weight) in weights.iter() {
        let scores = normalized
            .get(criterion)
            .ok_or_else(|| ConfigError::MissingCriterion {
                criterion: criterion.to_string(),
            })?;
        columns.push((criterion, weight, scores));
    }

    zones
        .into_iter()
        .map(|zone| -> Result<(ZoneId, f64), ScoringError> {
            let mut priority = 0.0;
            for (criterion, weight, scores) in &columns {
                let score = scores.get(zone).ok_or_else(|| ConfigError::MissingScore {
                    criterion: (*criterion).to_string(),
                    zone: zone.clone(),
                })?;
                priority += weight * score;
            }

            if !priority.is_finite()
                || priority < MIN_SCORE - SCORE_TOLERANCE
                || priority > MAX_SCORE + SCORE_TOLERANCE
            {
                return Err(ScoringError::InternalConsistency {
                    message: format!("priority score {priority} for zone {zone} is outside [0, 100]"),
                });
            }

            Ok((zone.clone(), priority))
        })
        .collect()
}
