//! Serde models for the WHOS timeseries API geoJSON documents and the
//! CUAHSI GetVariables mapping.
//!
//! Only the fields the tabulation engine consumes are modelled; the upstream
//! documents carry more and serde ignores the rest.

use serde::{Deserialize, Serialize};

/// A geoJSON FeatureCollection page as returned by the timeseries API.
///
/// The `features` key is absent when a query matches nothing, which is also
/// the pagination stop signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Deserialize<'de>"
))]
pub struct FeatureCollection<T> {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub features: Option<Vec<Feature<T>>>,
}

impl<T> FeatureCollection<T> {
    /// Number of features in the page; 0 when the key is absent.
    pub fn len(&self) -> usize {
        self.features.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature<T> {
    pub geometry: Option<Geometry>,
    pub properties: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Position as [longitude, latitude] with an optional third altitude
    /// element.
    pub coordinates: Vec<f64>,
}

impl Geometry {
    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.first().copied()
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.get(1).copied()
    }

    pub fn altitude(&self) -> Option<f64> {
        self.coordinates.get(2).copied()
    }
}

// --- monitoring-points ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringPointProperties {
    #[serde(rename = "monitoring-point")]
    pub monitoring_point: MonitoringPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringPoint {
    /// Free-form name/value metadata; known names include "country" and
    /// "organisationName".
    #[serde(default)]
    pub parameters: Vec<NamedValue>,
    pub sampled_feature: SampledFeature,
}

impl MonitoringPoint {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Reference to the sampled feature: `href` is the federated station
/// identifier, `title` the human-readable station name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampledFeature {
    pub href: String,
    #[serde(default)]
    pub title: String,
}

// --- timeseries ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeseriesProperties {
    pub timeseries: Timeseries,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeseries {
    pub feature_of_interest: FeatureOfInterest,
    pub observed_property: Reference,
    pub result: TimeseriesResult,
    /// Producing process metadata; carries the organisationName used for
    /// station organization enrichment.
    #[serde(default)]
    pub observation_process: Option<ObservationProcess>,
}

impl Timeseries {
    pub fn station_id(&self) -> &str {
        &self.feature_of_interest.sampled_feature.href
    }

    pub fn organisation_name(&self) -> Option<&str> {
        self.observation_process
            .as_ref()?
            .parameters
            .iter()
            .find(|p| p.name == "organisationName")
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureOfInterest {
    pub sampled_feature: SampledFeature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub href: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesResult {
    pub default_point_metadata: DefaultPointMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultPointMetadata {
    /// ISO-8601 aggregation duration, absent for instantaneous series.
    #[serde(default)]
    pub aggregation_duration: Option<String>,
    /// Unit of measure code.
    #[serde(default)]
    pub uom: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationProcess {
    #[serde(default)]
    pub parameters: Vec<NamedValue>,
}

// --- variable mapping ---

/// One row of the CUAHSI GetVariables (WaterML 1.1) mapping: the opaque
/// observed-property code, its harmonized name and unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableMapping {
    pub variable_code: String,
    pub variable_name: String,
    pub unit_name: Option<String>,
}
