//! Sub-basin lookup by point-in-polygon.
//!
//! Basin polygons are loaded from a GeoJSON file; each station coordinate is
//! matched against the basin outlines with a ray-casting test to fill the
//! SUBBASIN column of the station table.

use std::path::{Path, PathBuf};

use log::warn;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubBasinError {
    #[error("Failed to read basins file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse basins GeoJSON")]
    JsonParse(#[from] serde_json::Error),

    #[error("Basins GeoJSON has no 'features' array")]
    MissingFeatures,
}

#[derive(Debug, Clone)]
struct Basin {
    name: String,
    // One outer ring per polygon; interior rings (holes) are ignored.
    rings: Vec<Vec<(f64, f64)>>,
}

/// An in-memory set of named basin polygons.
#[derive(Debug, Clone, Default)]
pub struct SubBasinIndex {
    basins: Vec<Basin>,
}

impl SubBasinIndex {
    pub fn from_geojson_file(path: &Path) -> Result<Self, SubBasinError> {
        let bytes = std::fs::read(path)
            .map_err(|e| SubBasinError::Read(path.to_path_buf(), e))?;
        let doc: Value = serde_json::from_slice(&bytes)?;
        Self::from_geojson(&doc)
    }

    /// Builds the index from a parsed GeoJSON FeatureCollection. The basin
    /// name is taken from the `nombre_2`, `name` or `nombre` property.
    /// Features with other geometry types or no name are skipped.
    pub fn from_geojson(doc: &Value) -> Result<Self, SubBasinError> {
        let features = doc
            .get("features")
            .and_then(Value::as_array)
            .ok_or(SubBasinError::MissingFeatures)?;

        let mut basins = Vec::new();
        for feature in features {
            let Some(name) = basin_name(feature) else {
                warn!("Skipping basin feature without a name property");
                continue;
            };
            let Some(geometry) = feature.get("geometry") else {
                warn!("Skipping basin '{}' without geometry", name);
                continue;
            };
            let rings = match geometry.get("type").and_then(Value::as_str) {
                Some("Polygon") => polygon_outer_rings(geometry.get("coordinates")),
                Some("MultiPolygon") => multi_polygon_outer_rings(geometry.get("coordinates")),
                other => {
                    warn!("Skipping basin '{}' with geometry type {:?}", name, other);
                    continue;
                }
            };
            if rings.is_empty() {
                warn!("Skipping basin '{}' with empty geometry", name);
                continue;
            }
            basins.push(Basin { name, rings });
        }
        Ok(Self { basins })
    }

    pub fn is_empty(&self) -> bool {
        self.basins.is_empty()
    }

    /// Returns the name of the basin containing the point, if any. When
    /// outlines overlap the last matching basin wins.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&str> {
        let mut found = None;
        for basin in &self.basins {
            if basin
                .rings
                .iter()
                .any(|ring| ring_contains(ring, lon, lat))
            {
                found = Some(basin.name.as_str());
            }
        }
        found
    }
}

fn basin_name(feature: &Value) -> Option<String> {
    let properties = feature.get("properties")?;
    for key in ["nombre_2", "name", "nombre"] {
        if let Some(name) = properties.get(key).and_then(Value::as_str) {
            return Some(name.to_string());
        }
    }
    None
}

fn polygon_outer_rings(coordinates: Option<&Value>) -> Vec<Vec<(f64, f64)>> {
    // A Polygon is a list of rings; the first ring is the outer boundary.
    coordinates
        .and_then(Value::as_array)
        .and_then(|rings| rings.first())
        .map(parse_ring)
        .into_iter()
        .filter(|ring| !ring.is_empty())
        .collect()
}

fn multi_polygon_outer_rings(coordinates: Option<&Value>) -> Vec<Vec<(f64, f64)>> {
    coordinates
        .and_then(Value::as_array)
        .map(|polygons| {
            polygons
                .iter()
                .filter_map(|polygon| polygon.as_array().and_then(|rings| rings.first()))
                .map(parse_ring)
                .filter(|ring| !ring.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_ring(ring: &Value) -> Vec<(f64, f64)> {
    ring.as_array()
        .map(|positions| {
            positions
                .iter()
                .filter_map(|position| {
                    let coords = position.as_array()?;
                    Some((coords.first()?.as_f64()?, coords.get(1)?.as_f64()?))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Ray-casting point-in-polygon test over a single ring.
fn ring_contains(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square_basins() -> SubBasinIndex {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "nombre_2": "Alto Paraguay" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[
                            [-60.0, -20.0], [-56.0, -20.0],
                            [-56.0, -16.0], [-60.0, -16.0], [-60.0, -20.0]
                        ]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "name": "Delta" },
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [[[[
                            -60.0, -35.0], [-58.0, -35.0],
                            [-58.0, -33.0], [-60.0, -33.0], [-60.0, -35.0]
                        ]]]
                    }
                }
            ]
        });
        SubBasinIndex::from_geojson(&doc).unwrap()
    }

    #[test]
    fn locates_point_inside_polygon() {
        let index = square_basins();
        assert_eq!(index.locate(-58.0, -18.0), Some("Alto Paraguay"));
        assert_eq!(index.locate(-59.0, -34.0), Some("Delta"));
    }

    #[test]
    fn point_outside_all_basins_is_none() {
        let index = square_basins();
        assert_eq!(index.locate(0.0, 0.0), None);
    }

    #[test]
    fn missing_features_key_is_an_error() {
        let doc = json!({ "type": "FeatureCollection" });
        assert!(matches!(
            SubBasinIndex::from_geojson(&doc),
            Err(SubBasinError::MissingFeatures)
        ));
    }
}
