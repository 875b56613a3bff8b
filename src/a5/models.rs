//! Serde models for the a5 JSON API.
//!
//! The upstream schema uses Spanish field names; they are renamed to English
//! here and only the fields the tabulation engine consumes are kept.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A station ("estacion") record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A5Station {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "abreviatura", default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub geom: Option<A5Geometry>,
    #[serde(rename = "altitud", default)]
    pub altitude: Option<f64>,
    #[serde(rename = "pais", default)]
    pub country: Option<String>,
    #[serde(rename = "propietario", default)]
    pub owner: Option<String>,
    #[serde(rename = "tipo", default)]
    pub station_type: Option<String>,
    #[serde(rename = "nivel_aguas_bajas", default)]
    pub low_waters_level: Option<f64>,
    #[serde(rename = "nivel_alerta", default)]
    pub flood_alert_level: Option<f64>,
    #[serde(rename = "nivel_evacuacion", default)]
    pub evacuation_level: Option<f64>,
}

/// Station geometry. Coordinates are kept as raw JSON values because the API
/// serves placeholder strings for stations without a real location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A5Geometry {
    #[serde(default)]
    pub coordinates: Vec<serde_json::Value>,
}

impl A5Geometry {
    /// (longitude, latitude) when both coordinates are numeric.
    pub fn lon_lat(&self) -> Option<(f64, f64)> {
        let lon = self.coordinates.first()?.as_f64()?;
        let lat = self.coordinates.get(1)?.as_f64()?;
        Some((lon, lat))
    }
}

/// A time-series ("serie") record with its embedded station, variable and
/// unit metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A5Series {
    pub id: i64,
    #[serde(rename = "estacion")]
    pub station: A5Station,
    #[serde(rename = "var")]
    pub variable: A5Variable,
    #[serde(rename = "unidades", default)]
    pub units: Option<A5Units>,
    #[serde(default)]
    pub date_range: Option<A5DateRange>,
    #[serde(rename = "monthlyStats", default)]
    pub monthly_stats: Option<Vec<A5MonthlyStat>>,
    #[serde(default)]
    pub percentiles: Option<Vec<A5Percentile>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A5Variable {
    pub id: i64,
    #[serde(rename = "nombre", default)]
    pub name: Option<String>,
    /// Harmonized ODM name, e.g. "Gage height".
    #[serde(rename = "VariableName", default)]
    pub variable_name: Option<String>,
    /// Sampling interval as a name/amount object, e.g. `{"hours": 1}`.
    #[serde(rename = "timeSupport", default)]
    pub time_support: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub abrev: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A5Units {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub abrev: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A5DateRange {
    #[serde(default)]
    pub timestart: Option<String>,
    #[serde(default)]
    pub timeend: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// Per-month statistics for a series; `mon` is 1-based (1 = January).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A5MonthlyStat {
    pub mon: u32,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub p01: Option<f64>,
    #[serde(default)]
    pub p10: Option<f64>,
    #[serde(default)]
    pub p50: Option<f64>,
    #[serde(default)]
    pub p90: Option<f64>,
    #[serde(default)]
    pub p99: Option<f64>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// One requested percentile as a fraction in [0, 1] and its value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A5Percentile {
    #[serde(rename = "percentil", alias = "percentile")]
    pub fraction: f64,
    #[serde(rename = "valor", default)]
    pub value: Option<f64>,
}

/// A single observation of a series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A5Observation {
    #[serde(default)]
    pub series_id: Option<i64>,
    pub timestart: String,
    #[serde(default)]
    pub timeend: Option<String>,
    #[serde(rename = "valor", default)]
    pub value: Option<f64>,
}
