//! The FEWS station (locations) table.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use log::warn;
use polars::prelude::*;

use crate::a5::models::A5Station;
use crate::fews::columns::STATION_COLUMNS;
use crate::fews::error::TableError;
use crate::fews::{compare_ids, series_table::SeriesTable};
use crate::subbasin::SubBasinIndex;
use crate::whos::models::{Feature, MonitoringPointProperties};

/// One normalized station row.
#[derive(Debug, Clone)]
pub struct StationRow {
    pub station_id: String,
    pub station_name: String,
    pub short_name: String,
    pub tooltip: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub country: Option<String>,
    pub organization: String,
    pub subbasin: Option<String>,
    pub station_type: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StationTable {
    pub rows: Vec<StationRow>,
}

impl StationTable {
    /// Builds the table from WHOS monitoring points. Features without a point
    /// geometry are skipped with a warning.
    pub fn from_monitoring_points(
        features: &[Feature<MonitoringPointProperties>],
        basins: Option<&SubBasinIndex>,
    ) -> Self {
        let mut rows = Vec::with_capacity(features.len());
        for feature in features {
            let point = &feature.properties.monitoring_point;
            let station_id = point.sampled_feature.href.clone();
            let (Some(longitude), Some(latitude)) = (
                feature.geometry.as_ref().and_then(|g| g.longitude()),
                feature.geometry.as_ref().and_then(|g| g.latitude()),
            ) else {
                warn!("Monitoring point {} with no geometry, skipping", station_id);
                continue;
            };
            let title = point.sampled_feature.title.clone();
            rows.push(StationRow {
                station_id,
                station_name: title.clone(),
                short_name: short_station_name(&title),
                tooltip: title,
                latitude,
                longitude,
                altitude: feature.geometry.as_ref().and_then(|g| g.altitude()),
                country: point.parameter("country").map(str::to_string),
                organization: "WHOS".to_string(),
                subbasin: locate_basin(basins, longitude, latitude),
                station_type: None,
                parent_id: None,
            });
        }
        Self { rows }
    }

    /// Builds the table from a5 stations. Stations without numeric
    /// coordinates are skipped with a warning.
    pub fn from_a5_stations(stations: &[A5Station], basins: Option<&SubBasinIndex>) -> Self {
        let mut rows = Vec::with_capacity(stations.len());
        for station in stations {
            let Some((longitude, latitude)) = station.geom.as_ref().and_then(|g| g.lon_lat())
            else {
                warn!("Station {} with no geometry, skipping", station.id);
                continue;
            };
            let tooltip = match &station.owner {
                Some(owner) => format!(
                    "station {}: {} - property of {}",
                    station.id, station.name, owner
                ),
                None => format!("station {}: {}", station.id, station.name),
            };
            rows.push(StationRow {
                station_id: station.id.to_string(),
                station_name: station.name.clone(),
                short_name: station
                    .short_name
                    .clone()
                    .unwrap_or_else(|| short_station_name(&station.name)),
                tooltip,
                latitude,
                longitude,
                altitude: station.altitude,
                country: station.country.clone(),
                organization: "INA".to_string(),
                subbasin: locate_basin(basins, longitude, latitude),
                station_type: station.station_type.clone(),
                parent_id: None,
            });
        }
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn station_ids(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.station_id.as_str()).collect()
    }

    /// Overwrites the ORGANIZATION column with names harvested from series
    /// metadata, keyed by STATION_ID. Stations without a harvested name keep
    /// their default.
    pub fn merge_organizations(&mut self, organizations: &HashMap<String, String>) {
        for row in &mut self.rows {
            if let Some(name) = organizations.get(&row.station_id) {
                row.organization = name.clone();
            }
        }
    }

    /// Drops stations that do not appear in any series row.
    pub fn retain_with_timeseries(&mut self, series: &SeriesTable) {
        let referenced: std::collections::HashSet<&str> = series
            .rows
            .iter()
            .map(|r| r.station_id.as_str())
            .collect();
        let before = self.rows.len();
        self.rows.retain(|row| referenced.contains(row.station_id.as_str()));
        if self.rows.len() < before {
            warn!(
                "Dropped {} stations with no timeseries",
                before - self.rows.len()
            );
        }
    }

    /// Fills PARENT_ID with the provider-native identifier recovered from the
    /// federated station id.
    pub fn set_original_station_id(&mut self) {
        for row in &mut self.rows {
            row.parent_id = Some(original_station_id(&row.station_id));
        }
    }

    pub fn sort(&mut self) {
        self.rows
            .sort_by(|a, b| compare_ids(&a.station_id, &b.station_id));
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, TableError> {
        let mut columns = vec![
            Column::new(
                STATION_COLUMNS[0].into(),
                self.rows.iter().map(|r| r.station_id.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                STATION_COLUMNS[1].into(),
                self.rows.iter().map(|r| r.station_name.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                STATION_COLUMNS[2].into(),
                self.rows.iter().map(|r| r.short_name.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                STATION_COLUMNS[3].into(),
                self.rows.iter().map(|r| r.tooltip.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                STATION_COLUMNS[4].into(),
                self.rows.iter().map(|r| r.latitude).collect::<Vec<_>>(),
            ),
            Column::new(
                STATION_COLUMNS[5].into(),
                self.rows.iter().map(|r| r.longitude).collect::<Vec<_>>(),
            ),
            Column::new(
                STATION_COLUMNS[6].into(),
                self.rows.iter().map(|r| r.altitude).collect::<Vec<_>>(),
            ),
            Column::new(
                STATION_COLUMNS[7].into(),
                self.rows.iter().map(|r| r.country.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                STATION_COLUMNS[8].into(),
                self.rows.iter().map(|r| r.organization.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                STATION_COLUMNS[9].into(),
                self.rows.iter().map(|r| r.subbasin.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                STATION_COLUMNS[10].into(),
                self.rows.iter().map(|r| r.station_type.clone()).collect::<Vec<_>>(),
            ),
        ];
        if self.rows.iter().any(|r| r.parent_id.is_some()) {
            columns.push(Column::new(
                "PARENT_ID".into(),
                self.rows.iter().map(|r| r.parent_id.clone()).collect::<Vec<_>>(),
            ));
        }
        Ok(DataFrame::new(columns)?)
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path).map_err(|e| TableError::CsvWriteIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        CsvWriter::new(&mut file)
            .finish(&mut df)
            .map_err(|e| TableError::CsvWritePolars {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

/// Short name fallback: the name with spaces removed, truncated to 12
/// characters.
pub(crate) fn short_station_name(name: &str) -> String {
    name.replace(' ', "").chars().take(12).collect()
}

/// Recovers the provider-native station identifier from a federated href:
/// the part after the last '/', then after the last ':'.
pub fn original_station_id(href: &str) -> String {
    let tail = href.rsplit('/').next().unwrap_or(href);
    let tail = tail.rsplit(':').next().unwrap_or(tail);
    tail.to_string()
}

fn locate_basin(basins: Option<&SubBasinIndex>, lon: f64, lat: f64) -> Option<String> {
    basins?.locate(lon, lat).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a5::models::A5Geometry;
    use serde_json::json;

    fn a5_station(id: i64, name: &str, coords: Vec<serde_json::Value>) -> A5Station {
        A5Station {
            id,
            name: name.to_string(),
            short_name: None,
            geom: Some(A5Geometry { coordinates: coords }),
            altitude: None,
            country: Some("Argentina".to_string()),
            owner: None,
            station_type: None,
            low_waters_level: None,
            flood_alert_level: None,
            evacuation_level: None,
        }
    }

    #[test]
    fn short_name_strips_spaces_and_truncates() {
        assert_eq!(short_station_name("Puerto Pilcomayo Alto"), "PuertoPilcom");
        assert_eq!(short_station_name("Goya"), "Goya");
    }

    #[test]
    fn original_station_id_takes_last_path_and_colon_segment() {
        assert_eq!(
            original_station_id("http://example.org/stations/ar-ina:1234"),
            "1234"
        );
        assert_eq!(original_station_id("urn:whos:station:88"), "88");
        assert_eq!(original_station_id("plain-id"), "plain-id");
    }

    #[test]
    fn stations_without_numeric_coordinates_are_skipped() {
        let stations = vec![
            a5_station(1, "Goya", vec![json!(-59.26), json!(-29.14)]),
            a5_station(2, "Broken", vec![json!(""), json!("")]),
        ];
        let table = StationTable::from_a5_stations(&stations, None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].station_id, "1");
    }

    #[test]
    fn tooltip_mentions_owner_when_present() {
        let mut station = a5_station(7, "Corrientes", vec![json!(-58.8), json!(-27.5)]);
        station.owner = Some("PNA".to_string());
        let table = StationTable::from_a5_stations(&[station], None);
        assert_eq!(table.rows[0].tooltip, "station 7: Corrientes - property of PNA");
    }

    #[test]
    fn organization_merge_overwrites_by_station_id() {
        let mut table = StationTable {
            rows: vec![StationRow {
                station_id: "A1".to_string(),
                station_name: "One".to_string(),
                short_name: "One".to_string(),
                tooltip: "One".to_string(),
                latitude: -30.0,
                longitude: -58.0,
                altitude: None,
                country: None,
                organization: "WHOS".to_string(),
                subbasin: None,
                station_type: None,
                parent_id: None,
            }],
        };
        let mut organizations = HashMap::new();
        organizations.insert("A1".to_string(), "INA".to_string());
        table.merge_organizations(&organizations);
        assert_eq!(table.rows[0].organization, "INA");
    }

    #[test]
    fn sort_is_numeric_for_integer_ids() {
        let mut table = StationTable::from_a5_stations(
            &[
                a5_station(12, "B", vec![json!(-59.0), json!(-29.0)]),
                a5_station(9, "A", vec![json!(-59.0), json!(-29.0)]),
            ],
            None,
        );
        table.sort();
        assert_eq!(table.rows[0].station_id, "9");
    }
}
