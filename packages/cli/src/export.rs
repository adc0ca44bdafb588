//! Result export: JSON for the full run, CSV for spreadsheets, and
//! `GeoJSON` for mapping.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use priority_map_scoring_models::{CriterionDefinition, ResultRecord, ScoringRun, ZoneId};
use priority_map_spatial::{Properties, Zone, geojson_io};

use crate::error::CliError;

/// Writes the whole run (records and summary) as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`CliError`] if serialization or the write fails.
pub fn write_json(run: &ScoringRun, path: &Path) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(run)?;
    write_file(path, json.as_bytes())?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Writes one CSV row per zone to `path`.
///
/// # Errors
///
/// Returns [`CliError`] if the file cannot be created or written.
pub fn write_csv(
    run: &ScoringRun,
    criteria: &[CriterionDefinition],
    path: &Path,
) -> Result<(), CliError> {
    let file = std::fs::File::create(path).map_err(|source| CliError::Io {
        action: "create",
        path: path.to_path_buf(),
        source,
    })?;
    write_csv_to(run, criteria, file)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Writes one CSV row per zone.
///
/// Columns: `zone_id`, then `<criterion>_raw` and `<criterion>_normalized`
/// for each criterion in summation order, then `priority_score` and
/// `tier`.
///
/// # Errors
///
/// Returns [`CliError::Csv`] if a write fails.
pub fn write_csv_to<W: Write>(
    run: &ScoringRun,
    criteria: &[CriterionDefinition],
    writer: W,
) -> Result<(), CliError> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec!["zone_id".to_string()];
    for criterion in criteria {
        header.push(format!("{}_raw", criterion.name));
        header.push(format!("{}_normalized", criterion.name));
    }
    header.push("priority_score".to_string());
    header.push("tier".to_string());
    csv.write_record(&header)?;

    for record in &run.records {
        let mut row = vec![record.zone_id.to_string()];
        for criterion in criteria {
            match record.criterion(&criterion.name) {
                Some(score) => {
                    row.push(score.raw.to_string());
                    row.push(score.normalized.to_string());
                }
                None => row.extend([String::new(), String::new()]),
            }
        }
        row.push(record.priority_score.to_string());
        row.push(record.tier.clone());
        csv.write_record(&row)?;
    }

    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Writes the zone polygons with their results as a `GeoJSON`
/// `FeatureCollection`.
///
/// # Errors
///
/// Returns [`CliError`] if serialization or the write fails.
pub fn write_geojson(run: &ScoringRun, zones: &[Zone], path: &Path) -> Result<(), CliError> {
    let json = serde_json::to_string(&feature_collection(run, zones))?;
    write_file(path, json.as_bytes())?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn feature_collection(run: &ScoringRun, zones: &[Zone]) -> geojson::FeatureCollection {
    let records: BTreeMap<&ZoneId, &ResultRecord> =
        run.records.iter().map(|r| (&r.zone_id, r)).collect();

    geojson::FeatureCollection {
        bbox: None,
        features: zones
            .iter()
            .filter_map(|zone| {
                let record = records.get(zone.id())?;
                Some(geojson_io::zone_feature(zone, record_properties(record)))
            })
            .collect(),
        foreign_members: None,
    }
}

/// Flattens a record into `GeoJSON` properties, with the same column
/// names as the CSV export.
fn record_properties(record: &ResultRecord) -> Properties {
    let mut properties = Properties::new();
    let zone_id = match &record.zone_id {
        ZoneId::Int(id) => serde_json::Value::from(*id),
        ZoneId::Text(id) => serde_json::Value::from(id.as_str()),
    };
    properties.insert("zone_id".to_string(), zone_id);
    for score in &record.criteria {
        properties.insert(format!("{}_raw", score.criterion), score.raw.into());
        properties.insert(
            format!("{}_normalized", score.criterion),
            score.normalized.into(),
        );
    }
    properties.insert("priority_score".to_string(), record.priority_score.into());
    properties.insert("tier".to_string(), record.tier.clone().into());
    properties
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, bytes).map_err(|source| CliError::Io {
        action: "write",
        path: path.to_path_buf(),
        source,
    })
}
