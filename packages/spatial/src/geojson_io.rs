//! Conversion between `GeoJSON` documents and zones / feature layers.
//!
//! Accepts a `FeatureCollection` or a single `Feature`. Zone ids come from
//! a named property or the feature's own `id`; feature ids fall back to the
//! feature's position so diagnostics can always name the offender.

use std::collections::BTreeSet;

use geo::{Geometry, MultiPolygon};
use geojson::GeoJson;
use priority_map_scoring_models::ZoneId;

use crate::{Feature, Properties, SpatialError, Zone};

/// Parses zones from a `GeoJSON` string.
///
/// `id_property` names the property holding the zone id; when `None`, the
/// feature-level `id` is used.
///
/// # Errors
///
/// Returns [`SpatialError`] if the document cannot be parsed, a feature
/// has no geometry or id, a geometry is not polygonal, or an id repeats.
pub fn parse_zones(geojson_str: &str, id_property: Option<&str>) -> Result<Vec<Zone>, SpatialError> {
    let features = parse_root(geojson_str)?;
    let mut seen = BTreeSet::new();
    let mut zones = Vec::with_capacity(features.len());

    for (index, feature) in features.into_iter().enumerate() {
        let id = zone_id(&feature, index, id_property)?;
        let geometry = feature
            .geometry
            .ok_or(SpatialError::MissingGeometry { index })?;
        let geometry: Geometry<f64> = geometry.try_into()?;

        let polygons = match geometry {
            Geometry::MultiPolygon(mp) => mp,
            Geometry::Polygon(p) => MultiPolygon(vec![p]),
            _ => return Err(SpatialError::NonPolygonalZone { id }),
        };

        if !seen.insert(id.clone()) {
            return Err(SpatialError::DuplicateZone { id });
        }

        zones.push(Zone::new(id, polygons));
    }

    log::info!("Parsed {} zones", zones.len());
    Ok(zones)
}

/// Parses source features from a `GeoJSON` string.
///
/// `id_property` names the property holding the feature id; when `None`,
/// the feature-level `id` is used, then the feature's position.
///
/// # Errors
///
/// Returns [`SpatialError`] if the document cannot be parsed or a feature
/// has no geometry.
pub fn parse_features(
    geojson_str: &str,
    id_property: Option<&str>,
) -> Result<Vec<Feature>, SpatialError> {
    parse_root(geojson_str)?
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let id = feature_id(&feature, index, id_property);
            let geometry = feature
                .geometry
                .ok_or(SpatialError::MissingGeometry { index })?;

            Ok(Feature {
                id,
                geometry: geometry.try_into()?,
                properties: feature.properties.unwrap_or_default(),
            })
        })
        .collect()
}

/// Builds a `GeoJSON` feature for a zone, carrying `properties`.
#[must_use]
pub fn zone_feature(zone: &Zone, properties: Properties) -> geojson::Feature {
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(zone.geometry()))),
        id: Some(match zone.id() {
            ZoneId::Int(id) => geojson::feature::Id::Number((*id).into()),
            ZoneId::Text(id) => geojson::feature::Id::String(id.clone()),
        }),
        properties: Some(properties),
        foreign_members: None,
    }
}

fn parse_root(geojson_str: &str) -> Result<Vec<geojson::Feature>, SpatialError> {
    match geojson_str.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection.features),
        GeoJson::Feature(feature) => Ok(vec![feature]),
        GeoJson::Geometry(_) => Err(SpatialError::UnsupportedRoot),
    }
}

fn zone_id(
    feature: &geojson::Feature,
    index: usize,
    id_property: Option<&str>,
) -> Result<ZoneId, SpatialError> {
    if let Some(key) = id_property {
        let value = feature
            .property(key)
            .ok_or_else(|| SpatialError::MissingZoneId {
                index,
                message: format!("property '{key}' is absent"),
            })?;

        return match value {
            serde_json::Value::Number(n) => n.as_i64().map(ZoneId::Int).ok_or_else(|| {
                SpatialError::MissingZoneId {
                    index,
                    message: format!("property '{key}' is not an integer: {n}"),
                }
            }),
            serde_json::Value::String(s) if !s.trim().is_empty() => {
                Ok(ZoneId::Text(s.trim().to_string()))
            }
            other => Err(SpatialError::MissingZoneId {
                index,
                message: format!("property '{key}' is not a usable id: {other}"),
            }),
        };
    }

    match &feature.id {
        Some(geojson::feature::Id::String(s)) => Ok(ZoneId::Text(s.clone())),
        Some(geojson::feature::Id::Number(n)) => {
            n.as_i64()
                .map(ZoneId::Int)
                .ok_or_else(|| SpatialError::MissingZoneId {
                    index,
                    message: format!("feature id is not an integer: {n}"),
                })
        }
        None => Err(SpatialError::MissingZoneId {
            index,
            message: "feature has no id and no id property was configured".to_string(),
        }),
    }
}

fn feature_id(feature: &geojson::Feature, index: usize, id_property: Option<&str>) -> String {
    let from_property = id_property
        .and_then(|key| feature.property(key))
        .and_then(|value| match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    from_property
        .or_else(|| match &feature.id {
            Some(geojson::feature::Id::String(s)) => Some(s.clone()),
            Some(geojson::feature::Id::Number(n)) => Some(n.to_string()),
            None => None,
        })
        .unwrap_or_else(|| format!("#{index}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "cell": 2 },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "cell": 1 },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[1, 0], [2, 0], [2, 1], [1, 1], [1, 0]]]]
                }
            }
        ]
    }"#;

    #[test]
    fn parses_zones_from_property_ids() {
        let zones = parse_zones(ZONES, Some("cell")).unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].id(), &ZoneId::Int(2));
        assert_eq!(zones[1].id(), &ZoneId::Int(1));
        assert_eq!(zones[1].geometry().0.len(), 1);
    }

    #[test]
    fn zones_without_ids_are_rejected() {
        let err = parse_zones(ZONES, None).unwrap_err();
        assert!(
            matches!(err, SpatialError::MissingZoneId { index: 0, .. }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn duplicate_zone_ids_are_rejected() {
        let doc = ZONES.replace("\"cell\": 1", "\"cell\": 2");
        let err = parse_zones(&doc, Some("cell")).unwrap_err();
        assert!(matches!(err, SpatialError::DuplicateZone { .. }));
    }

    #[test]
    fn line_zone_is_rejected() {
        let doc = r#"{
            "type": "Feature",
            "id": "road",
            "properties": {},
            "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] }
        }"#;
        let err = parse_zones(doc, None).unwrap_err();
        assert!(matches!(err, SpatialError::NonPolygonalZone { .. }));
    }

    #[test]
    fn bare_geometry_root_is_rejected() {
        let doc = r#"{ "type": "Point", "coordinates": [0, 0] }"#;
        assert!(matches!(
            parse_features(doc, None).unwrap_err(),
            SpatialError::UnsupportedRoot
        ));
    }

    #[test]
    fn feature_ids_fall_back_to_position() {
        let doc = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": "hydrant-9",
                    "properties": { "kind": "hydrant" },
                    "geometry": { "type": "Point", "coordinates": [0.5, 0.5] }
                },
                {
                    "type": "Feature",
                    "properties": { "kind": "station" },
                    "geometry": { "type": "Point", "coordinates": [1.5, 0.5] }
                }
            ]
        }"#;

        let features = parse_features(doc, None).unwrap();
        assert_eq!(features[0].id, "hydrant-9");
        assert_eq!(features[1].id, "#1");
        assert_eq!(features[1].text("kind").as_deref(), Some("station"));
    }

    #[test]
    fn zone_feature_carries_id_and_properties() {
        let zones = parse_zones(ZONES, Some("cell")).unwrap();
        let mut properties = Properties::new();
        properties.insert("tier".to_string(), "High".into());

        let feature = zone_feature(&zones[0], properties);
        assert_eq!(feature.id, Some(geojson::feature::Id::Number(2.into())));
        assert_eq!(
            feature.property("tier"),
            Some(&serde_json::Value::from("High"))
        );
    }
}
