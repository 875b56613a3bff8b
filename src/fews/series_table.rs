//! The FEWS time-series table: one row per (station, parameter) with the
//! derived timestep, unit and threshold columns.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::path::Path;

use log::warn;
use polars::prelude::*;

use crate::a5::models::A5Series;
use crate::fews::columns::{
    monthly_threshold_column, order_threshold_columns, percentile_column, SERIES_BASE_COLUMNS,
    STAGE_THRESHOLD_COLUMNS,
};
use crate::fews::error::TableError;
use crate::fews::station_table::{original_station_id, StationTable};
use crate::fews::compare_ids;
use crate::timestep::{interval_to_hours, iso_duration_to_hours};
use crate::whos::models::{Feature, TimeseriesProperties, VariableMapping};

/// The ODM name of the stage variable; stage thresholds apply only to it.
const STAGE_VARIABLE: &str = "Gage height";

/// One normalized time-series row. Thresholds are kept as named values; the
/// table computes the union of names for the output columns.
#[derive(Debug, Clone)]
pub struct SeriesRow {
    pub station_id: String,
    pub external_location_id: String,
    pub external_parameter_id: String,
    pub timestep_hour: Option<f64>,
    pub unit: Option<String>,
    pub import_source: String,
    pub thresholds: Vec<(String, f64)>,
    /// Harmonized variable name, e.g. "Precipitation" or "Gage height".
    pub variable_name: Option<String>,
    /// Provider-local variable name, used to label per-variable outputs.
    pub variable_label: Option<String>,
    pub parent_id: Option<String>,
    pub timeseries_id: Option<String>,
}

impl SeriesRow {
    fn threshold(&self, column: &str) -> Option<f64> {
        self.thresholds
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| *value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeriesTable {
    pub rows: Vec<SeriesRow>,
}

impl SeriesTable {
    /// Builds the table from WHOS timeseries features. An unparseable
    /// aggregation duration leaves the timestep empty with a warning.
    pub fn from_whos_timeseries(features: &[Feature<TimeseriesProperties>]) -> Self {
        let mut rows = Vec::with_capacity(features.len());
        for feature in features {
            let timeseries = &feature.properties.timeseries;
            let station_id = timeseries.station_id().to_string();
            let metadata = &timeseries.result.default_point_metadata;
            let timestep_hour = match &metadata.aggregation_duration {
                Some(duration) => match iso_duration_to_hours(duration) {
                    Ok(hours) => Some(hours),
                    Err(e) => {
                        warn!("Station {}: {}", station_id, e);
                        None
                    }
                },
                None => None,
            };
            rows.push(SeriesRow {
                external_location_id: station_id.clone(),
                external_parameter_id: timeseries.observed_property.href.clone(),
                station_id,
                timestep_hour,
                unit: metadata.uom.clone(),
                import_source: "WHOS".to_string(),
                thresholds: Vec::new(),
                variable_name: None,
                variable_label: None,
                parent_id: None,
                timeseries_id: None,
            });
        }
        Self { rows }
    }

    /// Builds the table from a5 series. Stage thresholds are taken from the
    /// station record for the stage variable only; monthly statistics and
    /// percentiles become additional threshold columns.
    pub fn from_a5_series(series: &[A5Series]) -> Self {
        let mut rows = Vec::with_capacity(series.len());
        for item in series {
            let mut thresholds = Vec::new();
            if item.variable.variable_name.as_deref() == Some(STAGE_VARIABLE) {
                let stage_levels = [
                    item.station.low_waters_level,
                    item.station.flood_alert_level,
                    item.station.evacuation_level,
                ];
                for (column, level) in STAGE_THRESHOLD_COLUMNS.iter().zip(stage_levels) {
                    if let Some(level) = level {
                        thresholds.push((column.to_string(), level));
                    }
                }
            }
            if let Some(stats) = &item.monthly_stats {
                for stat in stats {
                    let values = [
                        ("mean", stat.mean),
                        ("p01", stat.p01),
                        ("p10", stat.p10),
                        ("p50", stat.p50),
                        ("p90", stat.p90),
                        ("p99", stat.p99),
                    ];
                    for (name, value) in values {
                        let (Some(column), Some(value)) =
                            (monthly_threshold_column(stat.mon, name), value)
                        else {
                            continue;
                        };
                        thresholds.push((column, value));
                    }
                }
            }
            if let Some(percentiles) = &item.percentiles {
                for percentile in percentiles {
                    if let Some(value) = percentile.value {
                        thresholds.push((percentile_column(percentile.fraction), value));
                    }
                }
            }
            rows.push(SeriesRow {
                station_id: item.station.id.to_string(),
                external_location_id: item.station.id.to_string(),
                external_parameter_id: item.variable.id.to_string(),
                timestep_hour: item
                    .variable
                    .time_support
                    .as_ref()
                    .and_then(interval_to_hours),
                unit: item.units.as_ref().and_then(|u| u.abrev.clone()),
                import_source: "INA".to_string(),
                thresholds,
                variable_name: item.variable.variable_name.clone(),
                variable_label: item.variable.name.clone(),
                parent_id: None,
                timeseries_id: None,
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

    /// Resolves EXTERNAL_PARAMETER_ID through the observed-property mapping,
    /// filling the harmonized variable name and unit.
    pub fn apply_variable_mapping(&mut self, mapping: &[VariableMapping]) {
        let by_code: HashMap<&str, &VariableMapping> = mapping
            .iter()
            .map(|m| (m.variable_code.as_str(), m))
            .collect();
        for row in &mut self.rows {
            match by_code.get(row.external_parameter_id.as_str()) {
                Some(mapped) => {
                    row.variable_name = Some(mapped.variable_name.clone());
                    if let Some(unit) = &mapped.unit_name {
                        row.unit = Some(unit.clone());
                    }
                }
                None => warn!(
                    "No variable mapping for parameter {}",
                    row.external_parameter_id
                ),
            }
        }
    }

    /// Drops rows referencing a station absent from the station table.
    pub fn retain_known_stations(&mut self, stations: &StationTable) {
        let known: HashSet<&str> = stations.rows.iter().map(|r| r.station_id.as_str()).collect();
        let before = self.rows.len();
        self.rows.retain(|row| known.contains(row.station_id.as_str()));
        if self.rows.len() < before {
            warn!(
                "Dropped {} series referencing unknown stations",
                before - self.rows.len()
            );
        }
    }

    /// Drops rows with no derivable timestep.
    pub fn delete_series_without_timestep(&mut self) {
        let before = self.rows.len();
        self.rows.retain(|row| row.timestep_hour.is_some());
        if self.rows.len() < before {
            warn!(
                "Dropped {} series without a timestep",
                before - self.rows.len()
            );
        }
    }

    /// Cross-source filter: drops rows whose PARENT_ID is absent from
    /// `reference` (typically the table built from the other source). Rows
    /// without a parent id are dropped too; run [`Self::set_original_station_id`]
    /// on both tables first.
    pub fn retain_parents_in(&mut self, reference: &SeriesTable) {
        let known: HashSet<&str> = reference
            .rows
            .iter()
            .filter_map(|r| r.parent_id.as_deref())
            .collect();
        let before = self.rows.len();
        self.rows.retain(|row| {
            row.parent_id
                .as_deref()
                .map_or(false, |parent| known.contains(parent))
        });
        if self.rows.len() < before {
            warn!(
                "Dropped {} series with parents missing from the reference table",
                before - self.rows.len()
            );
        }
    }

    /// Fills PARENT_ID and synthesizes TIMESERIES_ID as
    /// `<parent>_<parameter>`.
    pub fn set_original_station_id(&mut self) {
        for row in &mut self.rows {
            let parent = original_station_id(&row.station_id);
            row.timeseries_id = Some(format!("{}_{}", parent, row.external_parameter_id));
            row.parent_id = Some(parent);
        }
    }

    /// Splits the table into per-variable groups. With `fews` set, variable
    /// names collapse to the FEWS parameter codes and unmapped rows are
    /// dropped.
    pub fn group_by_variable(&self, fews: bool) -> Vec<(String, SeriesTable)> {
        let mut groups: BTreeMap<String, SeriesTable> = BTreeMap::new();
        for row in &self.rows {
            let key = if fews {
                row.variable_name
                    .as_deref()
                    .and_then(fews_variable_code)
                    .map(str::to_string)
            } else {
                row.variable_label
                    .clone()
                    .or_else(|| row.variable_name.clone())
            };
            let Some(key) = key else {
                continue;
            };
            groups.entry(key).or_default().rows.push(row.clone());
        }
        groups.into_iter().collect()
    }

    pub fn sort(&mut self) {
        self.rows.sort_by(|a, b| {
            compare_ids(&a.station_id, &b.station_id)
                .then_with(|| compare_ids(&a.external_parameter_id, &b.external_parameter_id))
        });
    }

    /// The union of threshold column names over all rows, in canonical order.
    pub fn threshold_columns(&self) -> Vec<String> {
        let names = self
            .rows
            .iter()
            .flat_map(|row| row.thresholds.iter().map(|(name, _)| name.clone()))
            .collect();
        order_threshold_columns(names)
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, TableError> {
        let mut columns = vec![
            Column::new(
                SERIES_BASE_COLUMNS[0].into(),
                self.rows.iter().map(|r| r.station_id.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                SERIES_BASE_COLUMNS[1].into(),
                self.rows
                    .iter()
                    .map(|r| r.external_location_id.clone())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                SERIES_BASE_COLUMNS[2].into(),
                self.rows
                    .iter()
                    .map(|r| r.external_parameter_id.clone())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                SERIES_BASE_COLUMNS[3].into(),
                self.rows.iter().map(|r| r.timestep_hour).collect::<Vec<_>>(),
            ),
            Column::new(
                SERIES_BASE_COLUMNS[4].into(),
                self.rows.iter().map(|r| r.unit.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                SERIES_BASE_COLUMNS[5].into(),
                self.rows.iter().map(|r| r.import_source.clone()).collect::<Vec<_>>(),
            ),
        ];
        for column in self.threshold_columns() {
            columns.push(Column::new(
                column.as_str().into(),
                self.rows
                    .iter()
                    .map(|r| r.threshold(&column))
                    .collect::<Vec<_>>(),
            ));
        }
        if self.rows.iter().any(|r| r.parent_id.is_some()) {
            columns.push(Column::new(
                "PARENT_ID".into(),
                self.rows.iter().map(|r| r.parent_id.clone()).collect::<Vec<_>>(),
            ));
        }
        if self.rows.iter().any(|r| r.timeseries_id.is_some()) {
            columns.push(Column::new(
                "TIMESERIES_ID".into(),
                self.rows.iter().map(|r| r.timeseries_id.clone()).collect::<Vec<_>>(),
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

/// FEWS parameter code for a harmonized variable name.
pub fn fews_variable_code(variable_name: &str) -> Option<&'static str> {
    match variable_name {
        "Precipitation" => Some("P"),
        "Level" => Some("H"),
        "Flux, discharge" => Some("Q"),
        _ => None,
    }
}

/// Harvests organisation names from timeseries metadata, keyed by station id.
pub fn organizations_from_timeseries(
    features: &[Feature<TimeseriesProperties>],
) -> HashMap<String, String> {
    let mut organizations = HashMap::new();
    for feature in features {
        let timeseries = &feature.properties.timeseries;
        if let Some(name) = timeseries.organisation_name() {
            organizations.insert(timeseries.station_id().to_string(), name.to_string());
        }
    }
    organizations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a5::models::{
        A5Geometry, A5MonthlyStat, A5Percentile, A5Station, A5Units, A5Variable,
    };
    use crate::fews::read_fews_csv;
    use serde_json::json;
    use std::collections::HashMap as StdHashMap;

    fn whos_feature(station: &str, parameter: &str, duration: Option<&str>) -> Feature<TimeseriesProperties> {
        let doc = json!({
            "type": "Feature",
            "properties": {
                "timeseries": {
                    "featureOfInterest": {
                        "sampledFeature": { "href": station, "title": station }
                    },
                    "observedProperty": { "href": parameter },
                    "result": {
                        "defaultPointMetadata": {
                            "aggregationDuration": duration,
                            "uom": "mm"
                        }
                    }
                }
            }
        });
        serde_json::from_value(doc).unwrap()
    }

    fn a5_series(station_id: i64, variable_id: i64, variable_name: Option<&str>) -> A5Series {
        A5Series {
            id: station_id * 100 + variable_id,
            station: A5Station {
                id: station_id,
                name: format!("station {}", station_id),
                short_name: None,
                geom: Some(A5Geometry {
                    coordinates: vec![json!(-58.8), json!(-27.5)],
                }),
                altitude: None,
                country: Some("Argentina".to_string()),
                owner: None,
                station_type: None,
                low_waters_level: Some(1.2),
                flood_alert_level: Some(6.5),
                evacuation_level: Some(7.3),
            },
            variable: A5Variable {
                id: variable_id,
                name: Some("altura".to_string()),
                variable_name: variable_name.map(str::to_string),
                time_support: Some(StdHashMap::from([("hours".to_string(), 1.0)])),
                abrev: None,
            },
            units: Some(A5Units {
                id: Some(11),
                abrev: Some("m".to_string()),
            }),
            date_range: None,
            monthly_stats: Some(vec![A5MonthlyStat {
                mon: 1,
                mean: Some(4.1),
                p01: Some(1.2),
                p10: None,
                p50: Some(3.9),
                p90: None,
                p99: Some(7.0),
                count: Some(930),
            }]),
            percentiles: Some(vec![A5Percentile {
                fraction: 0.05,
                value: Some(1.8),
            }]),
        }
    }

    #[test]
    fn whos_rows_derive_timestep_from_duration() {
        let features = vec![
            whos_feature("A", "P1", Some("PT1H")),
            whos_feature("B", "P1", None),
        ];
        let table = SeriesTable::from_whos_timeseries(&features);
        assert_eq!(table.rows[0].timestep_hour, Some(1.0));
        assert_eq!(table.rows[1].timestep_hour, None);
    }

    #[test]
    fn series_without_timestep_are_dropped() {
        let features = vec![
            whos_feature("A", "P1", Some("PT1H")),
            whos_feature("B", "P1", None),
        ];
        let mut table = SeriesTable::from_whos_timeseries(&features);
        table.delete_series_without_timestep();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].station_id, "A");
    }

    #[test]
    fn stage_thresholds_only_apply_to_gage_height() {
        let series = vec![
            a5_series(29, 2, Some("Gage height")),
            a5_series(30, 1, Some("Precipitation")),
        ];
        let table = SeriesTable::from_a5_series(&series);
        assert_eq!(table.rows[0].threshold("THRESHOLD_FLOOD_ALERT"), Some(6.5));
        assert_eq!(table.rows[1].threshold("THRESHOLD_FLOOD_ALERT"), None);
    }

    #[test]
    fn threshold_columns_are_canonically_ordered() {
        let table = SeriesTable::from_a5_series(&[a5_series(29, 2, Some("Gage height"))]);
        assert_eq!(
            table.threshold_columns(),
            vec![
                "THRESHOLD_LOW_WATERS",
                "THRESHOLD_FLOOD_ALERT",
                "THRESHOLD_EVACUATION",
                "THRESHOLD_jan_mean",
                "THRESHOLD_jan_p01",
                "THRESHOLD_jan_p50",
                "THRESHOLD_jan_p99",
                "THRESHOLD_P05",
            ]
        );
    }

    #[test]
    fn variable_mapping_fills_name_and_unit() {
        let mut table = SeriesTable::from_whos_timeseries(&[whos_feature(
            "A",
            "CODE1",
            Some("PT1H"),
        )]);
        table.apply_variable_mapping(&[VariableMapping {
            variable_code: "CODE1".to_string(),
            variable_name: "Precipitation".to_string(),
            unit_name: Some("mm/h".to_string()),
        }]);
        assert_eq!(table.rows[0].variable_name.as_deref(), Some("Precipitation"));
        assert_eq!(table.rows[0].unit.as_deref(), Some("mm/h"));
    }

    #[test]
    fn fews_grouping_drops_unmapped_variables() {
        let mut table = SeriesTable::from_whos_timeseries(&[
            whos_feature("A", "CODE1", Some("PT1H")),
            whos_feature("B", "CODE2", Some("PT1H")),
        ]);
        table.apply_variable_mapping(&[
            VariableMapping {
                variable_code: "CODE1".to_string(),
                variable_name: "Precipitation".to_string(),
                unit_name: None,
            },
            VariableMapping {
                variable_code: "CODE2".to_string(),
                variable_name: "Snow depth".to_string(),
                unit_name: None,
            },
        ]);
        let groups = table.group_by_variable(true);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "P");
        assert_eq!(groups[0].1.len(), 1);
    }

    #[test]
    fn timeseries_id_combines_parent_and_parameter() {
        let mut table = SeriesTable::from_whos_timeseries(&[whos_feature(
            "http://example.org/stations/ar-ina:1234",
            "P1",
            Some("PT1H"),
        )]);
        table.set_original_station_id();
        assert_eq!(table.rows[0].parent_id.as_deref(), Some("1234"));
        assert_eq!(table.rows[0].timeseries_id.as_deref(), Some("1234_P1"));
    }

    #[test]
    fn series_with_parents_missing_from_reference_are_dropped() {
        let mut whos = SeriesTable::from_whos_timeseries(&[
            whos_feature("http://example.org/stations/ar-ina:29", "CODE1", Some("PT1H")),
            whos_feature("http://example.org/stations/other:77", "CODE1", Some("PT1H")),
        ]);
        whos.set_original_station_id();
        let mut reference = SeriesTable::from_a5_series(&[a5_series(29, 2, Some("Gage height"))]);
        reference.set_original_station_id();
        whos.retain_parents_in(&reference);
        assert_eq!(whos.len(), 1);
        assert_eq!(whos.rows[0].parent_id.as_deref(), Some("29"));
    }

    #[test]
    fn rows_without_parent_ids_never_match_the_reference() {
        let mut whos = SeriesTable::from_whos_timeseries(&[whos_feature(
            "http://example.org/stations/ar-ina:29",
            "CODE1",
            Some("PT1H"),
        )]);
        // No set_original_station_id: parents are still unset.
        let mut reference = SeriesTable::from_a5_series(&[a5_series(29, 2, Some("Gage height"))]);
        reference.set_original_station_id();
        whos.retain_parents_in(&reference);
        assert!(whos.is_empty());
    }

    #[test]
    fn stations_absent_from_series_are_dropped() {
        let series = vec![a5_series(29, 2, Some("Gage height"))];
        let series_table = SeriesTable::from_a5_series(&series);
        let stations = vec![
            series[0].station.clone(),
            A5Station {
                id: 99,
                name: "orphan".to_string(),
                short_name: None,
                geom: Some(A5Geometry {
                    coordinates: vec![json!(-59.0), json!(-29.0)],
                }),
                altitude: None,
                country: None,
                owner: None,
                station_type: None,
                low_waters_level: None,
                flood_alert_level: None,
                evacuation_level: None,
            },
        ];
        let mut station_table = StationTable::from_a5_stations(&stations, None);
        station_table.retain_with_timeseries(&series_table);
        assert_eq!(station_table.len(), 1);
        assert_eq!(station_table.rows[0].station_id, "29");
    }

    #[test]
    fn csv_round_trip_preserves_rows_under_key() {
        let mut table = SeriesTable::from_a5_series(&[
            a5_series(30, 1, Some("Precipitation")),
            a5_series(29, 2, Some("Gage height")),
        ]);
        table.sort();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        table.write_csv(&path).unwrap();

        let df = read_fews_csv(&path).unwrap();
        assert_eq!(df.height(), table.len());
        let station_ids = df.column("STATION_ID").unwrap().i64().unwrap();
        let parameter_ids = df.column("EXTERNAL_PARAMETER_ID").unwrap().i64().unwrap();
        let keys: Vec<(String, String)> = station_ids
            .into_iter()
            .zip(parameter_ids)
            .map(|(s, p)| (s.unwrap().to_string(), p.unwrap().to_string()))
            .collect();
        let expected: Vec<(String, String)> = table
            .rows
            .iter()
            .map(|r| (r.station_id.clone(), r.external_parameter_id.clone()))
            .collect();
        assert_eq!(keys, expected);
    }
}
