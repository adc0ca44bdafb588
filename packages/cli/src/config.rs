//! TOML analysis file: where the zones and layers live, how each
//! criterion is measured, and how scores are tiered.
//!
//! Relative paths resolve against the directory of the analysis file, so
//! an analysis folder can be moved around as a unit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use priority_map_scoring::{ClassificationBands, ScoringPipeline, pipeline::DEFAULT_TOP_N};
use priority_map_scoring_models::{ClassificationBand, CriterionDefinition};
use priority_map_spatial::{FeatureLayer, LayerSet, Zone, geojson_io};
use serde::Deserialize;

use crate::error::CliError;

/// A `GeoJSON` input file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    /// Path to the file.
    pub path: PathBuf,
    /// Property holding the identifier. Falls back to the `GeoJSON`
    /// feature `id`.
    #[serde(default)]
    pub id_property: Option<String>,
}

/// A full analysis definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Number of zones listed in the ranking.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Zone polygons.
    pub zones: SourceConfig,
    /// Feature layers by name.
    #[serde(default)]
    pub layers: BTreeMap<String, SourceConfig>,
    /// Criteria in summation order.
    pub criteria: Vec<CriterionDefinition>,
    /// Tier bands. The default four bands apply when omitted.
    #[serde(default)]
    pub bands: Option<Vec<ClassificationBand>>,
}

const fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

impl AnalysisConfig {
    /// Reads and parses an analysis file.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let content = read(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base_dir)
    }

    /// Parses analysis TOML, resolving relative paths against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Toml`] for malformed TOML, unknown keys, or an
    /// unknown aggregation method.
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self, CliError> {
        let mut config: Self = toml::from_str(content)?;

        config.zones.path = resolve(base_dir, &config.zones.path);
        for source in config.layers.values_mut() {
            source.path = resolve(base_dir, &source.path);
        }

        Ok(config)
    }

    /// Builds the validated scoring pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] for invalid weights, rules, or bands.
    pub fn pipeline(&self) -> Result<ScoringPipeline, CliError> {
        let bands = match &self.bands {
            Some(bands) => ClassificationBands::new(bands.clone())?,
            None => ClassificationBands::default(),
        };

        Ok(ScoringPipeline::new(self.criteria.clone(), bands)?.with_top_n(self.top_n))
    }

    /// Loads the zone polygons.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] if the file is unreadable or holds invalid zones.
    pub fn load_zones(&self) -> Result<Vec<Zone>, CliError> {
        let content = read(&self.zones.path)?;
        let zones = geojson_io::parse_zones(&content, self.zones.id_property.as_deref())?;

        let invalid = zones.iter().filter(|zone| !zone.is_valid()).count();
        if invalid > 0 {
            log::warn!("{invalid} zones have invalid geometry and will fail scoring");
        }

        Ok(zones)
    }

    /// Loads and indexes every configured layer.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] naming the first layer that cannot be loaded.
    pub fn load_layers(&self) -> Result<LayerSet, CliError> {
        let mut layers = LayerSet::new();

        for (name, source) in &self.layers {
            let content = read(&source.path)?;
            let layer = geojson_io::parse_features(&content, source.id_property.as_deref())
                .and_then(|features| FeatureLayer::new(name.as_str(), features))
                .map_err(|source| CliError::Layer {
                    layer: name.clone(),
                    source,
                })?;

            log::info!("Loaded layer {name}: {} features", layer.len());
            layers.insert(layer);
        }

        Ok(layers)
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        action: "read",
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use priority_map_scoring::ConfigError;
    use priority_map_scoring_models::{AggregationMethod, AggregationRule, ZoneId};

    use super::*;

    const ANALYSIS: &str = r#"
top_n = 3

[zones]
path = "zones.geojson"
id_property = "zone_id"

[layers.mortality]
path = "layers/mortality.geojson"

[layers.roads]
path = "/data/roads.geojson"
id_property = "road_id"

[[criteria]]
name = "mortality"
weight = 0.7
method = "sum_attribute"
layer = "mortality"
attribute = "deaths"

[[criteria]]
name = "access"
weight = 0.3
method = "length_coverage"
layer = "roads"
"#;

    #[test]
    fn parses_and_resolves_paths() {
        let config = AnalysisConfig::parse(ANALYSIS, Path::new("/analyses/west")).unwrap();

        assert_eq!(config.top_n, 3);
        assert_eq!(
            config.zones.path,
            PathBuf::from("/analyses/west/zones.geojson")
        );
        assert_eq!(config.zones.id_property.as_deref(), Some("zone_id"));
        assert_eq!(
            config.layers["mortality"].path,
            PathBuf::from("/analyses/west/layers/mortality.geojson")
        );
        assert_eq!(
            config.layers["roads"].path,
            PathBuf::from("/data/roads.geojson")
        );

        let methods: Vec<AggregationMethod> =
            config.criteria.iter().map(|c| c.rule.method()).collect();
        assert_eq!(
            methods,
            vec![
                AggregationMethod::SumAttribute,
                AggregationMethod::LengthCoverage
            ]
        );
        assert!(config.bands.is_none());
    }

    #[test]
    fn top_n_defaults() {
        let config = AnalysisConfig::parse(
            r#"
[zones]
path = "z.geojson"

[[criteria]]
name = "a"
weight = 1.0
method = "area_overlap"
layer = "l"
"#,
            Path::new("."),
        )
        .unwrap();
        assert_eq!(config.top_n, DEFAULT_TOP_N);
        assert!(config.layers.is_empty());
    }

    #[test]
    fn multi_layer_criteria_and_custom_bands() {
        let config = AnalysisConfig::parse(
            r#"
[zones]
path = "z.geojson"

[[criteria]]
name = "utilities"
weight = 1.0
method = "weighted_multi_layer"

[[criteria.sub_layers]]
name = "transmission"
weight = 0.5
criticality = 3.0
method = "length_coverage"
layer = "lines"

[[criteria.sub_layers]]
name = "substations"
weight = 0.5
method = "point_count"
layer = "substations"
category_attribute = "class"
category_weights = { major = 2.0, minor = 0.5 }

[[bands]]
lower = 0.0
upper = 60.0
label = "Routine"

[[bands]]
lower = 60.0
upper = 100.0
label = "Urgent"
"#,
            Path::new("."),
        )
        .unwrap();

        let AggregationRule::WeightedMultiLayer { sub_layers } = &config.criteria[0].rule else {
            panic!("expected a multi-layer rule");
        };
        assert_eq!(sub_layers.len(), 2);
        assert!((sub_layers[0].criticality - 3.0).abs() < f64::EPSILON);
        assert!((sub_layers[1].criticality - 1.0).abs() < f64::EPSILON);

        let pipeline = config.pipeline().unwrap();
        let labels: Vec<&str> = pipeline.bands().labels().collect();
        assert_eq!(labels, vec!["Routine", "Urgent"]);
    }

    #[test]
    fn unknown_method_is_a_config_error() {
        let err = AnalysisConfig::parse(
            r#"
[zones]
path = "z.geojson"

[[criteria]]
name = "a"
weight = 1.0
method = "kernel_density"
layer = "l"
"#,
            Path::new("."),
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Toml(_)), "unexpected error: {err}");
    }

    #[test]
    fn bad_weights_fail_pipeline_construction() {
        let config = AnalysisConfig::parse(
            &ANALYSIS.replace("weight = 0.3", "weight = 0.2"),
            Path::new("."),
        )
        .unwrap();
        assert!(matches!(
            config.pipeline(),
            Err(CliError::Config(ConfigError::WeightSum { .. }))
        ));
    }

    #[test]
    fn gapped_bands_fail_pipeline_construction() {
        let config = AnalysisConfig::parse(
            r#"
[zones]
path = "z.geojson"

[[criteria]]
name = "a"
weight = 1.0
method = "area_overlap"
layer = "l"

[[bands]]
lower = 0.0
upper = 30.0
label = "Low"

[[bands]]
lower = 35.0
upper = 100.0
label = "High"
"#,
            Path::new("."),
        )
        .unwrap();
        assert!(matches!(
            config.pipeline(),
            Err(CliError::Config(ConfigError::BandGap { .. }))
        ));
    }

    #[test]
    fn loads_inputs_from_disk_and_scores() {
        let dir = std::env::temp_dir().join(format!("priority_map_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(
            dir.join("zones.geojson"),
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"zone_id":1},"geometry":{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
                {"type":"Feature","properties":{"zone_id":2},"geometry":{"type":"Polygon","coordinates":[[[10,0],[20,0],[20,10],[10,10],[10,0]]]}}
            ]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("stands.geojson"),
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[0,0],[5,0],[5,10],[0,10],[0,0]]]}},
                {"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[10,0],[20,0],[20,10],[10,10],[10,0]]]}}
            ]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("analysis.toml"),
            r#"
[zones]
path = "zones.geojson"
id_property = "zone_id"

[layers.stands]
path = "stands.geojson"

[[criteria]]
name = "stand_area"
weight = 1.0
method = "area_overlap"
layer = "stands"
"#,
        )
        .unwrap();

        let config = AnalysisConfig::load(&dir.join("analysis.toml")).unwrap();
        let zones = config.load_zones().unwrap();
        let layers = config.load_layers().unwrap();
        let run = config.pipeline().unwrap().run(&zones, &layers).unwrap();

        std::fs::remove_dir_all(&dir).ok();

        let scores: Vec<(ZoneId, f64)> = run
            .records
            .iter()
            .map(|r| (r.zone_id.clone(), r.priority_score))
            .collect();
        assert_eq!(scores[0].0, ZoneId::from(1));
        assert!((scores[0].1 - 50.0).abs() < 1e-9);
        assert!((scores[1].1 - 100.0).abs() < 1e-9);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = AnalysisConfig::load(Path::new("/nonexistent/analysis.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/analysis.toml"));
    }
}
