//! Max-relative normalization of one criterion's raw scores.
//!
//! Scores are corpus-relative: `normalized = raw / max_raw * 100`, where
//! `max_raw` is taken over the zones passed in. Scoring a different zone
//! set changes the result.

use std::collections::BTreeMap;

use priority_map_scoring_models::{MAX_SCORE, MIN_SCORE, ZoneId};

use crate::ScoringError;

/// Largest raw score, or `0` for an empty map.
#[must_use]
pub fn max_raw(raw_scores: &BTreeMap<ZoneId, f64>) -> f64 {
    raw_scores.values().copied().fold(0.0, f64::max)
}

/// Rescales raw scores onto `0..=100` relative to their maximum.
///
/// If every raw score is `0`, every normalized score is `0`.
///
/// # Errors
///
/// Returns [`ScoringError::InternalConsistency`] if a raw score is
/// negative or not finite. Aggregation never produces such values.
pub fn normalize(
    raw_scores: &BTreeMap<ZoneId, f64>,
) -> Result<BTreeMap<ZoneId, f64>, ScoringError> {
    if let Some((zone, raw)) = raw_scores
        .iter()
        .find(|(_, raw)| !raw.is_finite() || **raw < 0.0)
    {
        return Err(ScoringError::InternalConsistency {
            message: format!("raw score {raw} for zone {zone} cannot be normalized"),
        });
    }

    let max = max_raw(raw_scores);
    if max <= 0.0 {
        return Ok(raw_scores
            .keys()
            .map(|zone| (zone.clone(), MIN_SCORE))
            .collect());
    }

    raw_scores
        .iter()
        .map(|(zone, raw)| {
            let normalized = raw / max * MAX_SCORE;
            if (MIN_SCORE..=MAX_SCORE).contains(&normalized) {
                Ok((zone.clone(), normalized))
            } else {
                Err(ScoringError::InternalConsistency {
                    message: format!(
                        "normalized score {normalized} for zone {zone} is outside [0, 100]"
                    ),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scores(values: &[(i64, f64)]) -> BTreeMap<ZoneId, f64> {
        values
            .iter()
            .map(|(id, raw)| (ZoneId::Int(*id), *raw))
            .collect()
    }

    #[test]
    fn scales_relative_to_maximum() {
        let normalized = normalize(&scores(&[(1, 100.0), (2, 50.0), (3, 0.0)])).unwrap();
        assert_eq!(normalized[&ZoneId::Int(1)], 100.0);
        assert_eq!(normalized[&ZoneId::Int(2)], 50.0);
        assert_eq!(normalized[&ZoneId::Int(3)], 0.0);
    }

    #[test]
    fn all_zero_scores_normalize_to_zero() {
        let normalized = normalize(&scores(&[(1, 0.0), (2, 0.0)])).unwrap();
        assert!(normalized.values().all(|v| *v == 0.0));
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(normalize(&BTreeMap::new()).unwrap().is_empty());
    }

    #[test]
    fn subset_changes_normalization() {
        let full = normalize(&scores(&[(1, 100.0), (2, 50.0)])).unwrap();
        let subset = normalize(&scores(&[(2, 50.0)])).unwrap();
        assert_eq!(full[&ZoneId::Int(2)], 50.0);
        assert_eq!(subset[&ZoneId::Int(2)], 100.0);
    }

    #[test]
    fn negative_raw_score_is_an_internal_error() {
        assert!(matches!(
            normalize(&scores(&[(1, 10.0), (2, -1.0)])),
            Err(ScoringError::InternalConsistency { .. })
        ));
    }

    #[test]
    fn nan_raw_score_is_an_internal_error() {
        assert!(matches!(
            normalize(&scores(&[(1, f64::NAN)])),
            Err(ScoringError::InternalConsistency { .. })
        ));
    }

    proptest! {
        #[test]
        fn normalized_scores_stay_in_range(raws in prop::collection::vec(0.0f64..1e9, 1..40)) {
            let input: BTreeMap<ZoneId, f64> = raws
                .iter()
                .enumerate()
                .map(|(i, raw)| (ZoneId::Int(i64::try_from(i).unwrap()), *raw))
                .collect();
            let normalized = normalize(&input).unwrap();
            for value in normalized.values() {
                prop_assert!((0.0..=100.0).contains(value));
            }
        }

        #[test]
        fn any_all_zero_set_normalizes_to_zero(count in 0usize..40) {
            let input: BTreeMap<ZoneId, f64> = (0..count)
                .map(|i| (ZoneId::Int(i64::try_from(i).unwrap()), 0.0))
                .collect();
            let normalized = normalize(&input).unwrap();
            prop_assert_eq!(normalized.len(), count);
            prop_assert!(normalized.values().all(|value| *value == 0.0));
        }

        #[test]
        fn raising_the_maximum_never_lowers_its_score(
            raws in prop::collection::vec(0.0f64..1e6, 2..20),
            bump in 0.0f64..1e6,
        ) {
            let mut input: BTreeMap<ZoneId, f64> = raws
                .iter()
                .enumerate()
                .map(|(i, raw)| (ZoneId::Int(i64::try_from(i).unwrap()), *raw))
                .collect();
            let top = input
                .iter()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(zone, _)| zone.clone())
                .unwrap();

            let before = normalize(&input).unwrap()[&top];
            *input.get_mut(&top).unwrap() += bump;
            let after = normalize(&input).unwrap()[&top];

            prop_assert!(after >= before);
        }
    }
}
