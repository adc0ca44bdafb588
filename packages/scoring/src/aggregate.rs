//! Per-zone raw score measurement.
//!
//! Each [`AggregationRule`] variant is one handler here. Every call folds
//! over the candidate features of a single (zone, criterion) pair and
//! shares no state with other calls, so zones can be scored in parallel.

use std::collections::BTreeMap;

use geo::{
    Area, BooleanOps, Euclidean, Geometry, Intersects, LineString, MultiLineString,
    MultiPoint, MultiPolygon, Point, Relate,
};
use geo::line_measures::LengthMeasurable;
use priority_map_scoring_models::{AggregationRule, CriterionDefinition};
use priority_map_spatial::{Candidate, Feature, LayerSet, Zone};

use crate::{ConfigError, GeometryError, ScoringError};

/// Measures one zone against one criterion.
///
/// A zone with no intersecting features scores `0`.
///
/// # Errors
///
/// * [`ScoringError::Geometry`] if the zone, or a feature whose bounding box
///   touches the zone, has invalid geometry, or a feature has the wrong
///   geometry kind for the rule.
/// * [`ScoringError::Attribute`] if a summed attribute is missing, not
///   numeric, or negative.
/// * [`ScoringError::Config`] if the rule names a layer that is not loaded.
/// * [`ScoringError::InternalConsistency`] if the result is negative or
///   not finite.
pub fn aggregate(
    zone: &Zone,
    criterion: &CriterionDefinition,
    layers: &LayerSet,
) -> Result<f64, ScoringError> {
    if !zone.is_valid() {
        return Err(GeometryError {
            zone: zone.id().clone(),
            criterion: Some(criterion.name.clone()),
            layer: None,
            feature: None,
            reason: "zone geometry is invalid (empty, unclosed, or self-intersecting)".to_string(),
        }
        .into());
    }

    let ctx = AggregationContext {
        zone,
        criterion: &criterion.name,
        layers,
    };
    let raw = ctx.apply(&criterion.rule)?;

    if !raw.is_finite() || raw < 0.0 {
        return Err(ScoringError::InternalConsistency {
            message: format!(
                "raw score {raw} for zone {}, criterion '{}' is not a finite non-negative number",
                zone.id(),
                criterion.name
            ),
        });
    }

    Ok(raw)
}

struct AggregationContext<'a> {
    zone: &'a Zone,
    criterion: &'a str,
    layers: &'a LayerSet,
}

impl AggregationContext<'_> {
    fn apply(&self, rule: &AggregationRule) -> Result<f64, ScoringError> {
        match rule {
            AggregationRule::SumAttribute { layer, attribute } => {
                self.sum_attribute(layer, attribute)
            }
            AggregationRule::LengthCoverage { layer } => self.length_coverage(layer),
            AggregationRule::PointCount {
                layer,
                category_attribute,
                category_weights,
                default_weight,
            } => self.point_count(
                layer,
                category_attribute.as_deref(),
                category_weights,
                default_weight.unwrap_or(1.0),
            ),
            AggregationRule::AreaOverlap { layer } => self.area_overlap(layer),
            AggregationRule::WeightedMultiLayer { sub_layers } => {
                sub_layers.iter().try_fold(0.0, |acc, sub| {
                    let raw = self.apply(&sub.rule)?;
                    log::trace!(
                        "zone {} criterion '{}' sub-layer '{}': raw {raw}",
                        self.zone.id(),
                        self.criterion,
                        sub.name
                    );
                    Ok(sub.weight.mul_add(sub.criticality * raw, acc))
                })
            }
        }
    }

    /// Whole attribute value of every overlapping feature.
    fn sum_attribute(&self, layer: &str, attribute: &str) -> Result<f64, ScoringError> {
        self.candidates(layer)?
            .into_iter()
            .filter(|c| self.overlaps(&c.feature.geometry))
            .try_fold(0.0, |acc, c| {
                Ok(acc + self.attribute_value(layer, c.feature, attribute)?)
            })
    }

    /// Whether a feature counts toward the zone for `sum_attribute`.
    ///
    /// Lines and polygons must reach into the zone's interior; sharing only
    /// an edge or a vertex contributes nothing. Points follow `point_count`
    /// and count on the boundary too.
    fn overlaps(&self, geometry: &Geometry<f64>) -> bool {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => {
                geometry.intersects(self.zone.geometry())
            }
            _ => {
                let matrix = self.zone.geometry().relate(geometry);
                matrix.is_intersects() && !matrix.is_touches()
            }
        }
    }

    /// Length of each line feature clipped to the closed zone. A stretch
    /// running along the zone boundary counts for every zone sharing it.
    fn length_coverage(&self, layer: &str) -> Result<f64, ScoringError> {
        self.candidates(layer)?.into_iter().try_fold(0.0, |acc, c| {
            let lines = match &c.feature.geometry {
                Geometry::LineString(ls) => MultiLineString(vec![ls.clone()]),
                Geometry::MultiLineString(mls) => mls.clone(),
                Geometry::Line(line) => {
                    MultiLineString(vec![LineString::from(vec![line.start, line.end])])
                }
                other => return Err(self.wrong_kind(layer, c.feature, "line", other)),
            };

            if !lines.intersects(self.zone.geometry()) {
                return Ok(acc);
            }

            let clipped = self.zone.geometry().clip(&lines, false);
            Ok(acc + clipped.length(&Euclidean))
        })
    }

    /// Points inside or on the boundary, optionally weighted by category.
    fn point_count(
        &self,
        layer: &str,
        category_attribute: Option<&str>,
        category_weights: &BTreeMap<String, f64>,
        default_weight: f64,
    ) -> Result<f64, ScoringError> {
        self.candidates(layer)?.into_iter().try_fold(0.0, |acc, c| {
            let points: MultiPoint<f64> = match &c.feature.geometry {
                Geometry::Point(p) => MultiPoint(vec![*p]),
                Geometry::MultiPoint(mp) => mp.clone(),
                other => return Err(self.wrong_kind(layer, c.feature, "point", other)),
            };

            let inside = points
                .iter()
                .filter(|p: &&Point<f64>| self.zone.geometry().intersects(*p))
                .count();
            if inside == 0 {
                return Ok(acc);
            }

            let weight = category_attribute
                .and_then(|key| c.feature.text(key))
                .and_then(|category| category_weights.get(&category).copied())
                .unwrap_or(default_weight);

            #[allow(clippy::cast_precision_loss)]
            let inside = inside as f64;
            Ok(weight.mul_add(inside, acc))
        })
    }

    /// Area of each polygon feature clipped to the zone.
    fn area_overlap(&self, layer: &str) -> Result<f64, ScoringError> {
        self.candidates(layer)?.into_iter().try_fold(0.0, |acc, c| {
            let polygons = match &c.feature.geometry {
                Geometry::Polygon(p) => MultiPolygon(vec![p.clone()]),
                Geometry::MultiPolygon(mp) => mp.clone(),
                Geometry::Rect(rect) => MultiPolygon(vec![rect.to_polygon()]),
                Geometry::Triangle(tri) => MultiPolygon(vec![tri.to_polygon()]),
                other => return Err(self.wrong_kind(layer, c.feature, "polygon", other)),
            };

            if !polygons.intersects(self.zone.geometry()) {
                return Ok(acc);
            }

            Ok(acc + self.zone.geometry().intersection(&polygons).unsigned_area())
        })
    }

    /// Envelope candidates of a layer. Any invalid candidate fails the
    /// run rather than being skipped.
    fn candidates(&self, layer: &str) -> Result<Vec<Candidate<'_>>, ScoringError> {
        let features = self
            .layers
            .get(layer)
            .ok_or_else(|| ConfigError::UnknownLayer {
                criterion: self.criterion.to_string(),
                layer: layer.to_string(),
            })?;

        let Some(envelope) = self.zone.envelope() else {
            return Ok(Vec::new());
        };

        let candidates = features.candidates(&envelope);
        if let Some(invalid) = candidates.iter().find(|c| !c.valid) {
            return Err(self
                .feature_error(
                    layer,
                    invalid.feature,
                    "feature geometry is invalid (degenerate or self-intersecting)".to_string(),
                )
                .into());
        }

        Ok(candidates)
    }

    fn attribute_value(
        &self,
        layer: &str,
        feature: &Feature,
        attribute: &str,
    ) -> Result<f64, ScoringError> {
        let error = |message: String| ScoringError::Attribute {
            zone: self.zone.id().clone(),
            criterion: self.criterion.to_string(),
            layer: layer.to_string(),
            feature: feature.id.clone(),
            attribute: attribute.to_string(),
            message,
        };

        let Some(raw) = feature.attribute(attribute) else {
            return Err(error("is missing".to_string()));
        };
        let Some(value) = feature.number(attribute) else {
            return Err(error(format!("is not numeric: {raw}")));
        };
        if !value.is_finite() || value < 0.0 {
            return Err(error(format!("must be finite and non-negative, got {value}")));
        }

        Ok(value)
    }

    fn wrong_kind(
        &self,
        layer: &str,
        feature: &Feature,
        expected: &str,
        actual: &Geometry<f64>,
    ) -> ScoringError {
        self.feature_error(
            layer,
            feature,
            format!("expected {expected} geometry, got {}", geometry_kind(actual)),
        )
        .into()
    }

    fn feature_error(&self, layer: &str, feature: &Feature, reason: String) -> GeometryError {
        GeometryError {
            zone: self.zone.id().clone(),
            criterion: Some(self.criterion.to_string()),
            layer: Some(layer.to_string()),
            feature: Some(feature.id.clone()),
            reason,
        }
    }
}

const fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
