//! Building footprints from GeoJSON.
//!
//! Accepts a FeatureCollection, a single Feature or a bare geometry.
//! `Polygon` and `MultiPolygon` exterior rings become obstacles; interior
//! rings are ignored and other geometry types are skipped.

use std::path::Path;

use anyhow::{Context, Result};
use geojson::{Feature, GeoJson, Geometry, Value};
use skyway_core::{Obstacle, Polygon};

pub fn load_obstacles(path: &Path) -> Result<Vec<Obstacle>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading obstacles from {}", path.display()))?;
    parse_obstacles(&raw).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_obstacles(raw: &str) -> Result<Vec<Obstacle>> {
    let geojson: GeoJson = raw.parse().context("invalid GeoJSON")?;
    let mut obstacles = Vec::new();
    match geojson {
        GeoJson::FeatureCollection(collection) => {
            for feature in &collection.features {
                push_feature(feature, &mut obstacles);
            }
        }
        GeoJson::Feature(feature) => push_feature(&feature, &mut obstacles),
        GeoJson::Geometry(geometry) => push_geometry(&geometry, None, &mut obstacles),
    }
    tracing::debug!("loaded {} obstacles", obstacles.len());
    Ok(obstacles)
}

fn push_feature(feature: &Feature, out: &mut Vec<Obstacle>) {
    let name = feature
        .properties
        .as_ref()
        .and_then(|props| props.get("name"))
        .and_then(|value| value.as_str())
        .map(str::to_string);
    match &feature.geometry {
        Some(geometry) => push_geometry(geometry, name.as_deref(), out),
        None => tracing::warn!("skipping feature without geometry"),
    }
}

fn push_geometry(geometry: &Geometry, name: Option<&str>, out: &mut Vec<Obstacle>) {
    match &geometry.value {
        Value::Polygon(rings) => push_rings(rings, name, out),
        Value::MultiPolygon(polygons) => {
            for rings in polygons {
                push_rings(rings, name, out);
            }
        }
        Value::GeometryCollection(members) => {
            for member in members {
                push_geometry(member, name, out);
            }
        }
        _ => tracing::debug!("skipping non-polygon geometry"),
    }
}

fn push_rings(rings: &[Vec<Vec<f64>>], name: Option<&str>, out: &mut Vec<Obstacle>) {
    let Some(exterior) = rings.first() else {
        return;
    };
    let coords: Vec<[f64; 2]> = exterior
        .iter()
        .filter(|position| position.len() >= 2)
        .map(|position| [position[0], position[1]])
        .collect();
    let footprint = Polygon::from_lng_lat(&coords);
    out.push(match name {
        Some(name) => Obstacle::named(name, footprint),
        None => Obstacle::new(footprint),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMPUS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"name": "Engineering Hall"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-117.8420, 33.6430], [-117.8410, 33.6430],
                        [-117.8410, 33.6440], [-117.8420, 33.6440],
                        [-117.8420, 33.6430]
                    ]]
                }
            },
            {
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[-117.8400, 33.6430], [-117.8395, 33.6430], [-117.8395, 33.6435], [-117.8400, 33.6430]]],
                        [[[-117.8390, 33.6430], [-117.8385, 33.6430], [-117.8385, 33.6435], [-117.8390, 33.6430]]]
                    ]
                }
            },
            {
                "type": "Feature",
                "properties": {"name": "Flagpole"},
                "geometry": {"type": "Point", "coordinates": [-117.8405, 33.6445]}
            }
        ]
    }"#;

    #[test]
    fn collection_polygons_and_multipolygons_become_obstacles() {
        let obstacles = parse_obstacles(CAMPUS).unwrap();
        assert_eq!(obstacles.len(), 3);
        assert_eq!(obstacles[0].name.as_deref(), Some("Engineering Hall"));
        assert_eq!(obstacles[0].footprint.len(), 4);
        assert_eq!(obstacles[0].footprint.ring()[0].lat, 33.6430);
        assert_eq!(obstacles[0].footprint.ring()[0].lng, -117.8420);
        assert!(obstacles[1].name.is_none());
        assert_eq!(obstacles[2].footprint.len(), 3);
    }

    #[test]
    fn bare_geometry_is_accepted() {
        let raw = r#"{"type": "Polygon", "coordinates": [[[0.0, 0.0], [0.001, 0.0], [0.001, 0.001], [0.0, 0.0]]]}"#;
        let obstacles = parse_obstacles(raw).unwrap();
        assert_eq!(obstacles.len(), 1);
        assert!(obstacles[0].name.is_none());
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(parse_obstacles("{\"type\": \"Nope\"}").is_err());
        assert!(parse_obstacles("not json").is_err());
    }
}
