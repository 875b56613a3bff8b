//! Client for the a5 JSON API.
//!
//! The a5 service exposes station, series and variable catalogs as plain
//! JSON arrays. List-valued query parameters are sent comma-joined and
//! authentication, when enabled, is a bearer token.

use std::time::Duration;

use bon::bon;
use log::info;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::a5::error::A5Error;
use crate::a5::models::{A5MonthlyStat, A5Observation, A5Series, A5Station, A5Variable};

/// Connection parameters for an a5 deployment.
#[derive(Debug, Clone)]
pub struct A5Config {
    pub url: String,
    /// Bearer token; `None` disables authentication.
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for A5Config {
    fn default() -> Self {
        Self {
            url: "https://alerta.ina.gob.ar/a5".to_string(),
            token: None,
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct A5Client {
    config: A5Config,
    http: reqwest::Client,
}

#[bon]
impl A5Client {
    pub fn new(config: A5Config) -> Result<Self, A5Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(A5Error::ClientBuild)?;
        Ok(Self { config, http })
    }

    /// Fetches the station catalog, optionally filtered.
    #[builder]
    pub async fn stations(
        &self,
        name: Option<String>,
        country: Option<String>,
        has_observations: Option<bool>,
        real: Option<bool>,
        enabled: Option<bool>,
        owner: Option<String>,
        table: Option<String>,
    ) -> Result<Vec<A5Station>, A5Error> {
        let url = format!("{}/obs/puntual/estaciones", self.config.url);
        let mut params: Vec<(&str, String)> = Vec::new();
        push_param(&mut params, "nombre", name);
        push_param(&mut params, "pais", country);
        push_param(&mut params, "has_obs", has_observations);
        push_param(&mut params, "real", real);
        push_param(&mut params, "habilitar", enabled);
        push_param(&mut params, "propietario", owner);
        push_param(&mut params, "tabla", table);
        self.get_json(&url, &params).await
    }

    /// Fetches series metadata, optionally with per-month statistics and
    /// requested percentiles attached.
    #[builder]
    pub async fn series(
        &self,
        ids: Option<Vec<i64>>,
        station_ids: Option<Vec<i64>>,
        variable_ids: Option<Vec<i64>>,
        procedure_ids: Option<Vec<i64>>,
        unit_ids: Option<Vec<i64>>,
        table: Option<String>,
        date_range_after: Option<String>,
        monthly_stats: Option<bool>,
        percentiles: Option<bool>,
        percentile_fractions: Option<Vec<f64>>,
    ) -> Result<Vec<A5Series>, A5Error> {
        let url = format!("{}/obs/puntual/series", self.config.url);
        let mut params: Vec<(&str, String)> = Vec::new();
        push_param(&mut params, "id", ids.map(|v| join_values(&v)));
        push_param(&mut params, "estacion_id", station_ids.map(|v| join_values(&v)));
        push_param(&mut params, "var_id", variable_ids.map(|v| join_values(&v)));
        push_param(&mut params, "proc_id", procedure_ids.map(|v| join_values(&v)));
        push_param(&mut params, "unit_id", unit_ids.map(|v| join_values(&v)));
        push_param(&mut params, "tabla", table);
        push_param(&mut params, "date_range_after", date_range_after);
        push_param(&mut params, "getMonthlyStats", monthly_stats);
        push_param(&mut params, "getPercentiles", percentiles);
        push_param(
            &mut params,
            "percentil",
            percentile_fractions.map(|v| join_values(&v)),
        );
        self.get_json(&url, &params).await
    }

    /// Fetches series for a list of stations in batches, to keep request
    /// URLs within what the service accepts.
    #[builder]
    pub async fn series_by_station_batches(
        &self,
        station_ids: Vec<i64>,
        variable_ids: Option<Vec<i64>>,
        procedure_ids: Option<Vec<i64>>,
        date_range_after: Option<String>,
        monthly_stats: Option<bool>,
        percentiles: Option<bool>,
        percentile_fractions: Option<Vec<f64>>,
        #[builder(default = 40)] batch_size: usize,
    ) -> Result<Vec<A5Series>, A5Error> {
        let mut series = Vec::new();
        for batch in station_ids.chunks(batch_size.max(1)) {
            info!(
                "downloading series for stations {} to {}",
                batch.first().copied().unwrap_or_default(),
                batch.last().copied().unwrap_or_default()
            );
            let part = self
                .series()
                .station_ids(batch.to_vec())
                .maybe_variable_ids(variable_ids.clone())
                .maybe_procedure_ids(procedure_ids.clone())
                .maybe_date_range_after(date_range_after.clone())
                .maybe_monthly_stats(monthly_stats)
                .maybe_percentiles(percentiles)
                .maybe_percentile_fractions(percentile_fractions.clone())
                .call()
                .await?;
            series.extend(part);
        }
        Ok(series)
    }

    /// Fetches the variable catalog.
    #[builder]
    pub async fn variables(
        &self,
        ids: Option<Vec<i64>>,
        variable_names: Option<Vec<String>>,
    ) -> Result<Vec<A5Variable>, A5Error> {
        let url = format!("{}/obs/variables", self.config.url);
        let mut params: Vec<(&str, String)> = Vec::new();
        push_param(&mut params, "id", ids.map(|v| join_values(&v)));
        push_param(
            &mut params,
            "VariableName",
            variable_names.map(|v| v.join(",")),
        );
        self.get_json(&url, &params).await
    }

    /// Fetches the per-month statistics of a single series.
    pub async fn monthly_stats(&self, series_id: i64) -> Result<Vec<A5MonthlyStat>, A5Error> {
        #[derive(Deserialize)]
        struct MonthlyStatsResponse {
            #[serde(default)]
            values: Vec<A5MonthlyStat>,
        }

        let url = format!(
            "{}/obs/puntual/series/{}/estadisticosMensuales",
            self.config.url, series_id
        );
        let params = [("format", "json".to_string())];
        let response: MonthlyStatsResponse = self.get_json(&url, &params).await?;
        Ok(response.values)
    }

    /// Fetches observations of a series over a time window.
    #[builder]
    pub async fn observations(
        &self,
        series_id: i64,
        timestart: String,
        timeend: String,
    ) -> Result<Vec<A5Observation>, A5Error> {
        let url = format!("{}/obs/puntual/observaciones", self.config.url);
        let params = [
            ("series_id", series_id.to_string()),
            ("timestart", timestart),
            ("timeend", timeend),
        ];
        self.get_json(&url, &params).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, A5Error> {
        let mut request = self.http.get(url).query(params);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| A5Error::NetworkRequest(url.to_string(), e))?;
        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                return Err(if let Some(status) = e.status() {
                    A5Error::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    }
                } else {
                    A5Error::NetworkRequest(url.to_string(), e)
                });
            }
        };
        let text = response
            .text()
            .await
            .map_err(|e| A5Error::ResponseBody(url.to_string(), e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn join_values<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn push_param<T: ToString>(
    params: &mut Vec<(&'static str, String)>,
    name: &'static str,
    value: Option<T>,
) {
    if let Some(value) = value {
        params.push((name, value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_parameters_are_comma_joined() {
        assert_eq!(join_values(&[1, 2, 4, 39, 40]), "1,2,4,39,40");
        assert_eq!(join_values(&[0.05, 0.95]), "0.05,0.95");
        assert_eq!(join_values::<i64>(&[]), "");
    }

    #[test]
    fn absent_parameters_are_not_sent() {
        let mut params: Vec<(&str, String)> = Vec::new();
        push_param(&mut params, "pais", Some("Argentina"));
        push_param(&mut params, "has_obs", None::<bool>);
        assert_eq!(params, vec![("pais", "Argentina".to_string())]);
    }
}
