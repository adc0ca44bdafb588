//! Corpus-level summary statistics over a result table.

use std::cmp::Ordering;

use priority_map_scoring_models::{
    CriterionDefinition, CriterionSummary, RankedZone, ResultRecord, SummaryStatistics, TierCount,
};

use crate::ClassificationBands;

/// Orders records by descending priority score, ties broken by ascending
/// zone id.
#[must_use]
pub fn rank(records: &[ResultRecord]) -> Vec<&ResultRecord> {
    let mut ranked: Vec<&ResultRecord> = records.iter().collect();
    ranked.sort_by(|a, b| compare_priority(a, b));
    ranked
}

fn compare_priority(a: &ResultRecord, b: &ResultRecord) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then_with(|| a.zone_id.cmp(&b.zone_id))
}

/// Summarizes a result table.
///
/// An empty table yields zeroed statistics.
#[must_use]
pub fn summarize(
    records: &[ResultRecord],
    criteria: &[CriterionDefinition],
    bands: &ClassificationBands,
    top_n: usize,
) -> SummaryStatistics {
    let scores: Vec<f64> = records.iter().map(|r| r.priority_score).collect();
    let zone_count = records.len() as u64;

    let tiers = bands
        .labels()
        .map(|label| {
            let count = records.iter().filter(|r| r.tier == label).count() as u64;
            TierCount {
                label: label.to_string(),
                count,
                percentage: percentage(count, zone_count),
            }
        })
        .collect();

    let top_zones = rank(records)
        .into_iter()
        .take(top_n)
        .zip(1u64..)
        .map(|(record, rank)| RankedZone {
            rank,
            zone_id: record.zone_id.clone(),
            priority_score: record.priority_score,
            tier: record.tier.clone(),
        })
        .collect();

    let criteria = criteria
        .iter()
        .map(|criterion| {
            let scores: Vec<(f64, f64)> = records
                .iter()
                .filter_map(|r| r.criterion(&criterion.name))
                .map(|s| (s.raw, s.normalized))
                .collect();
            let raws: Vec<f64> = scores.iter().map(|(raw, _)| *raw).collect();
            let normalized: Vec<f64> = scores.iter().map(|(_, n)| *n).collect();

            CriterionSummary {
                criterion: criterion.name.clone(),
                weight: criterion.weight,
                max_raw: raws.iter().copied().fold(0.0, f64::max),
                mean_raw: mean(&raws),
                mean_normalized: mean(&normalized),
                nonzero_zones: raws.iter().filter(|raw| **raw > 0.0).count() as u64,
            }
        })
        .collect();

    SummaryStatistics {
        zone_count,
        mean: mean(&scores),
        std_dev: sample_std_dev(&scores),
        median: median(&scores),
        min: scores.iter().copied().reduce(f64::min).unwrap_or(0.0),
        max: scores.iter().copied().reduce(f64::max).unwrap_or(0.0),
        tiers,
        top_zones,
        criteria,
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (`n - 1` denominator).
#[allow(clippy::cast_precision_loss)]
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    match (sorted.len() % 2, sorted.get(mid)) {
        (_, None) => 0.0,
        (1, Some(middle)) => *middle,
        (_, Some(upper)) => sorted
            .get(mid.wrapping_sub(1))
            .map_or(*upper, |lower| (lower + upper) / 2.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use priority_map_scoring_models::{AggregationRule, CriterionScore, ZoneId};

    fn record(zone: impl Into<ZoneId>, score: f64, tier: &str) -> ResultRecord {
        ResultRecord {
            zone_id: zone.into(),
            criteria: vec![CriterionScore {
                criterion: "c".to_string(),
                raw: score * 2.0,
                normalized: score,
            }],
            priority_score: score,
            tier: tier.to_string(),
        }
    }

    fn criteria() -> Vec<CriterionDefinition> {
        vec![CriterionDefinition {
            name: "c".to_string(),
            weight: 1.0,
            rule: AggregationRule::AreaOverlap {
                layer: "l".to_string(),
            },
        }]
    }

    #[test]
    fn ties_are_ranked_by_ascending_zone_id() {
        let records = vec![
            record("b", 50.0, "High"),
            record("c", 80.0, "Critical"),
            record("a", 50.0, "High"),
        ];
        let ids: Vec<&ZoneId> = rank(&records).into_iter().map(|r| &r.zone_id).collect();
        assert_eq!(
            ids,
            vec![&ZoneId::from("c"), &ZoneId::from("a"), &ZoneId::from("b")]
        );
    }

    #[test]
    fn summary_statistics() {
        let records = vec![
            record(1, 10.0, "Low"),
            record(2, 20.0, "Low"),
            record(3, 60.0, "High"),
            record(4, 90.0, "Critical"),
        ];
        let summary = summarize(&records, &criteria(), &ClassificationBands::default(), 2);

        assert_eq!(summary.zone_count, 4);
        assert!((summary.mean - 45.0).abs() < 1e-9);
        assert!((summary.median - 40.0).abs() < 1e-9);
        assert!((summary.min - 10.0).abs() < 1e-9);
        assert!((summary.max - 90.0).abs() < 1e-9);
        // deviations: -35, -25, 15, 45 -> 1225 + 625 + 225 + 2025 = 4100
        assert!((summary.std_dev - (4100.0_f64 / 3.0).sqrt()).abs() < 1e-9);
        assert!((summary.std_dev - 36.968_455).abs() < 1e-6);

        let counts: Vec<(&str, u64)> = summary
            .tiers
            .iter()
            .map(|t| (t.label.as_str(), t.count))
            .collect();
        assert_eq!(
            counts,
            vec![("Low", 2), ("Medium", 0), ("High", 1), ("Critical", 1)]
        );
        assert!((summary.tiers[0].percentage - 50.0).abs() < 1e-9);

        assert_eq!(summary.top_zones.len(), 2);
        assert_eq!(summary.top_zones[0].zone_id, ZoneId::from(4));
        assert_eq!(summary.top_zones[0].rank, 1);
        assert_eq!(summary.top_zones[1].zone_id, ZoneId::from(3));

        let criterion = &summary.criteria[0];
        assert!((criterion.max_raw - 180.0).abs() < 1e-9);
        assert!((criterion.mean_normalized - 45.0).abs() < 1e-9);
        assert_eq!(criterion.nonzero_zones, 4);
    }

    #[test]
    fn odd_median_and_single_zone_std_dev() {
        assert!((median(&[3.0, 1.0, 2.0]) - 2.0).abs() < f64::EPSILON);
        assert!(sample_std_dev(&[42.0]).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_table_yields_zeroes() {
        let summary = summarize(&[], &criteria(), &ClassificationBands::default(), 5);
        assert_eq!(summary.zone_count, 0);
        assert!(summary.mean.abs() < f64::EPSILON);
        assert!(summary.top_zones.is_empty());
        assert!(summary.tiers.iter().all(|t| t.count == 0));
    }
}
