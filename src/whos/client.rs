//! Client for the WHOS timeseries API.
//!
//! WHOS exposes monitoring points and time-series metadata as geoJSON behind
//! token/view scoped endpoints, plus a CUAHSI (WaterML 1.1) service for the
//! observed-property mapping. Collection endpoints are paginated with
//! offset/limit; pagination stops on a short page or when the response omits
//! the `features` key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::bon;
use log::{info, warn};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::DeserializeOwned;

use crate::whos::error::WhosError;
use crate::whos::models::{
    Feature, FeatureCollection, MonitoringPointProperties, TimeseriesProperties, VariableMapping,
};

/// Connection parameters for a WHOS deployment.
#[derive(Debug, Clone)]
pub struct WhosConfig {
    pub url: String,
    pub token: String,
    /// WHOS view identifier, e.g. "whos-plata".
    pub view: String,
    pub monitoring_points_max: usize,
    pub monitoring_points_per_page: usize,
    pub timeseries_max: usize,
    pub timeseries_per_page: usize,
    pub timeout: Duration,
}

impl Default for WhosConfig {
    fn default() -> Self {
        Self {
            url: "https://whos.geodab.eu".to_string(),
            token: String::new(),
            view: "whos-plata".to_string(),
            monitoring_points_max: 6000,
            monitoring_points_per_page: 1000,
            timeseries_max: 48_000,
            timeseries_per_page: 1000,
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct WhosClient {
    config: WhosConfig,
    http: reqwest::Client,
}

#[bon]
impl WhosClient {
    pub fn new(config: WhosConfig) -> Result<Self, WhosError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(WhosError::ClientBuild)?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, tail: &str) -> String {
        format!(
            "{}/gs-service/services/essi/token/{}/view/{}/{}",
            self.config.url, self.config.token, self.config.view, tail
        )
    }

    /// Fetches a single page of monitoring points, optionally restricted to a
    /// bounding box.
    #[builder]
    pub async fn monitoring_points(
        &self,
        east: Option<f64>,
        west: Option<f64>,
        north: Option<f64>,
        south: Option<f64>,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<FeatureCollection<MonitoringPointProperties>, WhosError> {
        let url = self.endpoint("timeseries-api/monitoring-points");
        let mut params = bbox_params(east, west, north, south);
        push_param(&mut params, "offset", offset);
        push_param(&mut params, "limit", limit);
        self.get_json(&url, &params).await
    }

    /// Fetches a single page of time-series metadata. `begin_position` and
    /// `end_position` narrow the temporal extent (ISO-8601 dates).
    #[builder]
    pub async fn timeseries(
        &self,
        monitoring_point: Option<String>,
        observed_property: Option<String>,
        begin_position: Option<String>,
        end_position: Option<String>,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<FeatureCollection<TimeseriesProperties>, WhosError> {
        let url = self.endpoint("timeseries-api/timeseries");
        let mut params: Vec<(&str, String)> = Vec::new();
        push_param(&mut params, "monitoringPoint", monitoring_point);
        push_param(&mut params, "observedProperty", observed_property);
        push_param(&mut params, "beginPosition", begin_position);
        push_param(&mut params, "endPosition", end_position);
        push_param(&mut params, "offset", offset);
        push_param(&mut params, "limit", limit);
        self.get_json(&url, &params).await
    }

    /// Fetches all monitoring points with pagination. When `snapshot_dir` is
    /// set, each raw geoJSON page is written there as
    /// `monitoringPointsResponse_<offset>.json`.
    #[builder]
    pub async fn monitoring_points_all(
        &self,
        east: Option<f64>,
        west: Option<f64>,
        north: Option<f64>,
        south: Option<f64>,
        snapshot_dir: Option<PathBuf>,
    ) -> Result<Vec<Feature<MonitoringPointProperties>>, WhosError> {
        let url = self.endpoint("timeseries-api/monitoring-points");
        let base = bbox_params(east, west, north, south);
        let limit = self.config.monitoring_points_per_page;
        let max = self.config.monitoring_points_max;

        let mut features = Vec::new();
        let mut offset = 1;
        loop {
            info!("monitoring-points offset: {}", offset);
            let mut params = base.clone();
            push_param(&mut params, "offset", Some(offset));
            push_param(&mut params, "limit", Some(limit));
            let text = self.get_text(&url, &params).await?;
            if let Some(dir) = &snapshot_dir {
                let path = dir.join(format!("monitoringPointsResponse_{}.json", offset));
                write_snapshot(&path, &text).await?;
            }
            let page: FeatureCollection<MonitoringPointProperties> =
                serde_json::from_str(&text)?;
            let page_len = page.len();
            match page.features {
                Some(items) => features.extend(items),
                None => warn!("no monitoring points found at offset {}", offset),
            }
            match next_offset(offset, page_len, limit, max) {
                Some(next) => offset = next,
                None => break,
            }
        }
        Ok(features)
    }

    /// Fetches all time-series metadata with pagination. A list of
    /// monitoring points and/or observed properties limits the catalog; each
    /// combination is paginated separately, the way the upstream API expects
    /// single-valued filters.
    #[builder]
    pub async fn timeseries_all(
        &self,
        monitoring_points: Option<Vec<String>>,
        observed_properties: Option<Vec<String>>,
        begin_position: Option<String>,
        end_position: Option<String>,
        snapshot_dir: Option<PathBuf>,
    ) -> Result<Vec<Feature<TimeseriesProperties>>, WhosError> {
        let mut base: Vec<(&str, String)> = Vec::new();
        push_param(&mut base, "beginPosition", begin_position);
        push_param(&mut base, "endPosition", end_position);

        let mut filters: Vec<Vec<(&str, String)>> = Vec::new();
        match (&monitoring_points, &observed_properties) {
            (None, None) => filters.push(Vec::new()),
            (Some(points), None) => {
                for point in points {
                    filters.push(vec![("monitoringPoint", point.clone())]);
                }
            }
            (None, Some(properties)) => {
                for property in properties {
                    filters.push(vec![("observedProperty", property.clone())]);
                }
            }
            (Some(points), Some(properties)) => {
                for point in points {
                    for property in properties {
                        filters.push(vec![
                            ("monitoringPoint", point.clone()),
                            ("observedProperty", property.clone()),
                        ]);
                    }
                }
            }
        }

        let mut features = Vec::new();
        for filter in filters {
            let mut params = base.clone();
            params.extend(filter);
            self.paginate_timeseries(&params, snapshot_dir.as_deref(), &mut features)
                .await?;
        }
        Ok(features)
    }

    async fn paginate_timeseries(
        &self,
        base: &[(&'static str, String)],
        snapshot_dir: Option<&Path>,
        features: &mut Vec<Feature<TimeseriesProperties>>,
    ) -> Result<(), WhosError> {
        let url = self.endpoint("timeseries-api/timeseries");
        let limit = self.config.timeseries_per_page;
        let max = self.config.timeseries_max;

        let mut offset = 1;
        loop {
            info!("timeseries offset: {}", offset);
            let mut params = base.to_vec();
            push_param(&mut params, "offset", Some(offset));
            push_param(&mut params, "limit", Some(limit));
            let text = self.get_text(&url, &params).await?;
            if let Some(dir) = snapshot_dir {
                let path = dir.join(format!("timeseriesResponse_{}.json", offset));
                write_snapshot(&path, &text).await?;
            }
            let page: FeatureCollection<TimeseriesProperties> = serde_json::from_str(&text)?;
            let page_len = page.len();
            match page.features {
                Some(items) => features.extend(items),
                None => warn!("no timeseries found at offset {}", offset),
            }
            match next_offset(offset, page_len, limit, max) {
                Some(next) => offset = next,
                None => break,
            }
        }
        Ok(())
    }

    /// Retrieves the observed-property mapping from the CUAHSI GetVariables
    /// service (WaterML 1.1 wrapped in SOAP).
    pub async fn variable_mapping(&self) -> Result<Vec<VariableMapping>, WhosError> {
        let url = self.endpoint("cuahsi_1_1.asmx");
        let params = [("request", "GetVariables".to_string())];
        let text = self.get_text(&url, &params).await?;
        parse_get_variables(&text)
    }

    async fn get_text(&self, url: &str, params: &[(&str, String)]) -> Result<String, WhosError> {
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| WhosError::NetworkRequest(url.to_string(), e))?;
        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                return Err(if let Some(status) = e.status() {
                    WhosError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    }
                } else {
                    WhosError::NetworkRequest(url.to_string(), e)
                });
            }
        };
        response
            .text()
            .await
            .map_err(|e| WhosError::ResponseBody(url.to_string(), e))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, WhosError> {
        let text = self.get_text(url, params).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Next page offset, or `None` when pagination must stop: the page was short
/// (including the missing-`features` case, which counts as 0 items) or the
/// configured cap is reached.
fn next_offset(offset: usize, page_len: usize, limit: usize, max: usize) -> Option<usize> {
    if limit == 0 || page_len < limit {
        return None;
    }
    let next = offset + limit;
    if next > max {
        return None;
    }
    Some(next)
}

fn bbox_params(
    east: Option<f64>,
    west: Option<f64>,
    north: Option<f64>,
    south: Option<f64>,
) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    push_param(&mut params, "east", east);
    push_param(&mut params, "west", west);
    push_param(&mut params, "north", north);
    push_param(&mut params, "south", south);
    params
}

fn push_param<T: ToString>(params: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<T>) {
    if let Some(value) = value {
        params.push((name, value.to_string()));
    }
}

async fn write_snapshot(path: &Path, text: &str) -> Result<(), WhosError> {
    tokio::fs::write(path, text)
        .await
        .map_err(|e| WhosError::SnapshotWrite(path.to_path_buf(), e))
}

/// Parses the GetVariables SOAP response. The inner WaterML document arrives
/// entity-escaped and is unescaped before reading.
pub(crate) fn parse_get_variables(xml: &str) -> Result<Vec<VariableMapping>, WhosError> {
    #[derive(Default)]
    struct Partial {
        code: Option<String>,
        name: Option<String>,
        unit: Option<String>,
    }
    #[derive(Clone, Copy)]
    enum Field {
        Code,
        Name,
        Unit,
    }

    let unescaped = xml.replace("&lt;", "<").replace("&gt;", ">");
    let mut reader = Reader::from_str(&unescaped);
    reader.config_mut().trim_text(true);

    let mut variables = Vec::new();
    let mut current: Option<Partial> = None;
    let mut field: Option<Field> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"variable" => current = Some(Partial::default()),
                b"variableCode" => field = Some(Field::Code),
                b"variableName" => field = Some(Field::Name),
                b"unitName" => field = Some(Field::Unit),
                _ => field = None,
            },
            Event::Text(t) => {
                if let (Some(partial), Some(field)) = (current.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map_err(quick_xml::Error::from)?
                        .into_owned();
                    match field {
                        Field::Code => partial.code = Some(text),
                        Field::Name => partial.name = Some(text),
                        Field::Unit => partial.unit = Some(text),
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"variable" {
                    match current.take() {
                        Some(Partial {
                            code: Some(code),
                            name: Some(name),
                            unit,
                        }) => variables.push(VariableMapping {
                            variable_code: code,
                            variable_name: name,
                            unit_name: unit,
                        }),
                        _ => warn!("Skipping variable element without code or name"),
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if variables.is_empty() {
        return Err(WhosError::EmptyVariableMapping);
    }
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_stops_on_short_page() {
        // Full page: keep going.
        assert_eq!(next_offset(1, 1000, 1000, 48_000), Some(1001));
        // Short page: stop.
        assert_eq!(next_offset(1001, 312, 1000, 48_000), None);
        // Missing features key counts as an empty page.
        assert_eq!(next_offset(1, 0, 1000, 48_000), None);
    }

    #[test]
    fn pagination_stops_at_configured_cap() {
        assert_eq!(next_offset(5001, 1000, 1000, 6000), None);
        assert_eq!(next_offset(4001, 1000, 1000, 6000), Some(5001));
    }

    #[test]
    fn get_variables_response_parses() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <GetVariablesResponse xmlns="http://www.cuahsi.org/his/1.1/ws/">
      <GetVariablesResult>&lt;variablesResponse xmlns="http://www.cuahsi.org/waterML/1.1/"&gt;
        &lt;variables&gt;
          &lt;variable&gt;
            &lt;variableCode&gt;B838A449A5FBC64CBB8A204A5CD614519EB0844A&lt;/variableCode&gt;
            &lt;variableName&gt;Precipitation&lt;/variableName&gt;
            &lt;unit&gt;&lt;unitName&gt;mm&lt;/unitName&gt;&lt;/unit&gt;
          &lt;/variable&gt;
          &lt;variable&gt;
            &lt;variableCode&gt;4E47D870E717581F520F6C4EBE8E23962A880107&lt;/variableCode&gt;
            &lt;variableName&gt;Level&lt;/variableName&gt;
            &lt;unit&gt;&lt;unitName&gt;m&lt;/unitName&gt;&lt;/unit&gt;
          &lt;/variable&gt;
        &lt;/variables&gt;
      &lt;/variablesResponse&gt;</GetVariablesResult>
    </GetVariablesResponse>
  </soap:Body>
</soap:Envelope>"#;
        let variables = parse_get_variables(xml).unwrap();
        assert_eq!(variables.len(), 2);
        assert_eq!(variables[0].variable_name, "Precipitation");
        assert_eq!(variables[0].unit_name.as_deref(), Some("mm"));
        assert_eq!(
            variables[1].variable_code,
            "4E47D870E717581F520F6C4EBE8E23962A880107"
        );
    }

    #[test]
    fn empty_get_variables_response_is_an_error() {
        let xml = "<Envelope><Body></Body></Envelope>";
        assert!(matches!(
            parse_get_variables(xml),
            Err(WhosError::EmptyVariableMapping)
        ));
    }
}
