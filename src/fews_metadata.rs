//! Main entry point: wires the two catalog clients and the optional
//! sub-basin index into the FEWS table pipelines.

use std::path::{Path, PathBuf};

use bon::bon;
use log::info;

use crate::a5::client::{A5Client, A5Config};
use crate::error::FewsMetadataError;
use crate::fews::error::TableError;
use crate::fews::series_table::{organizations_from_timeseries, SeriesTable};
use crate::fews::station_table::StationTable;
use crate::subbasin::SubBasinIndex;
use crate::whos::client::{WhosClient, WhosConfig};

/// The outcome of a table pipeline: the final station table, the full series
/// table and its per-variable groups as written to disk.
pub struct FewsTableSet {
    pub stations: StationTable,
    pub series: SeriesTable,
    pub groups: Vec<(String, SeriesTable)>,
}

impl FewsTableSet {
    /// Keeps only series whose PARENT_ID also appears in `reference` (the
    /// table set built from the other source) and rebuilds the per-variable
    /// groups. `fews` selects the grouping mode, as in
    /// [`SeriesTable::group_by_variable`].
    pub fn retain_series_in(&mut self, reference: &FewsTableSet, fews: bool) {
        self.series.retain_parents_in(&reference.series);
        self.groups = self.series.group_by_variable(fews);
    }

    /// Writes the set to `output_dir`: `locations.csv`, the combined
    /// `series.csv` and one `<prefix><var>.csv` per group.
    pub fn write_csv(&self, output_dir: &Path, group_prefix: &str) -> Result<(), TableError> {
        self.stations.write_csv(&output_dir.join("locations.csv"))?;
        self.series.write_csv(&output_dir.join("series.csv"))?;
        for (name, group) in &self.groups {
            group.write_csv(&output_dir.join(format!("{}{}.csv", group_prefix, name)))?;
        }
        Ok(())
    }
}

/// The main client for building FEWS metadata tables.
///
/// Wraps a [`WhosClient`] and an [`A5Client`] plus an optional basin index
/// used to fill the SUBBASIN column.
///
/// # Examples
///
/// ```no_run
/// use fews_metadata::{FewsMetadata, FewsMetadataError, WhosConfig};
/// use std::path::PathBuf;
///
/// # async fn run() -> Result<(), FewsMetadataError> {
/// let client = FewsMetadata::builder()
///     .whos_config(WhosConfig {
///         token: "my-token".to_string(),
///         ..WhosConfig::default()
///     })
///     .build()?;
/// let tables = client
///     .make_whos_tables()
///     .output_dir(PathBuf::from("results"))
///     .call()
///     .await?;
/// println!("{} stations, {} series", tables.stations.len(), tables.series.len());
/// # Ok(())
/// # }
/// ```
pub struct FewsMetadata {
    whos: WhosClient,
    a5: A5Client,
    subbasins: Option<SubBasinIndex>,
}

#[bon]
impl FewsMetadata {
    /// Creates a client. Omitted configs fall back to their defaults; a basin
    /// GeoJSON file enables sub-basin lookup.
    #[builder]
    pub fn new(
        whos_config: Option<WhosConfig>,
        a5_config: Option<A5Config>,
        basins_geojson: Option<PathBuf>,
    ) -> Result<Self, FewsMetadataError> {
        let subbasins = match basins_geojson {
            Some(path) => Some(SubBasinIndex::from_geojson_file(&path)?),
            None => None,
        };
        Ok(Self {
            whos: WhosClient::new(whos_config.unwrap_or_default())?,
            a5: A5Client::new(a5_config.unwrap_or_default())?,
            subbasins,
        })
    }

    /// Builds the FEWS tables from the WHOS catalog and writes them to
    /// `output_dir`: `locations.csv` plus one `<VAR>.csv` per FEWS variable.
    ///
    /// An `observed_properties` list restricts the timeseries retrieval to
    /// those parameter codes. `save_geojson` also writes the raw API pages.
    #[builder]
    pub async fn make_whos_tables(
        &self,
        output_dir: PathBuf,
        observed_properties: Option<Vec<String>>,
        begin_position: Option<String>,
        end_position: Option<String>,
        #[builder(default)] save_geojson: bool,
    ) -> Result<FewsTableSet, FewsMetadataError> {
        ensure_output_dir(&output_dir).await?;
        let snapshot_dir = save_geojson.then(|| output_dir.clone());

        let points = self
            .whos
            .monitoring_points_all()
            .maybe_snapshot_dir(snapshot_dir.clone())
            .call()
            .await?;
        let mut stations = StationTable::from_monitoring_points(&points, self.subbasins.as_ref());
        info!("Retrieved {} monitoring points", stations.len());

        let mapping = self.whos.variable_mapping().await?;
        let features = self
            .whos
            .timeseries_all()
            .maybe_observed_properties(observed_properties)
            .maybe_begin_position(begin_position)
            .maybe_end_position(end_position)
            .maybe_snapshot_dir(snapshot_dir)
            .call()
            .await?;
        info!("Retrieved {} timeseries", features.len());

        stations.merge_organizations(&organizations_from_timeseries(&features));

        let mut series = SeriesTable::from_whos_timeseries(&features);
        series.apply_variable_mapping(&mapping);
        series.delete_series_without_timestep();
        series.retain_known_stations(&stations);
        stations.retain_with_timeseries(&series);
        stations.set_original_station_id();
        series.set_original_station_id();
        stations.sort();
        series.sort();

        let tables = FewsTableSet {
            groups: series.group_by_variable(true),
            stations,
            series,
        };
        tables.write_csv(&output_dir, "")?;
        Ok(tables)
    }

    /// Builds the FEWS tables from the a5 catalog and writes them to
    /// `output_dir`: `locations.csv` plus one `INA_<var>.csv` per variable.
    ///
    /// Stations are restricted to enabled ones with observations; series are
    /// fetched in station batches with monthly statistics attached.
    #[builder]
    pub async fn make_a5_tables(
        &self,
        output_dir: PathBuf,
        country: Option<String>,
        variable_ids: Option<Vec<i64>>,
        procedure_ids: Option<Vec<i64>>,
        date_range_after: Option<String>,
        #[builder(default = true)] monthly_stats: bool,
        percentile_fractions: Option<Vec<f64>>,
    ) -> Result<FewsTableSet, FewsMetadataError> {
        ensure_output_dir(&output_dir).await?;

        let a5_stations = self
            .a5
            .stations()
            .maybe_country(country)
            .has_observations(true)
            .enabled(true)
            .call()
            .await?;
        let stations = StationTable::from_a5_stations(&a5_stations, self.subbasins.as_ref());
        info!("Retrieved {} stations", stations.len());

        let station_ids: Vec<i64> = stations
            .rows
            .iter()
            .filter_map(|row| row.station_id.parse().ok())
            .collect();
        let a5_series = self
            .a5
            .series_by_station_batches()
            .station_ids(station_ids)
            .maybe_variable_ids(variable_ids)
            .maybe_procedure_ids(procedure_ids)
            .maybe_date_range_after(date_range_after)
            .monthly_stats(monthly_stats)
            .maybe_percentiles(percentile_fractions.as_ref().map(|_| true))
            .maybe_percentile_fractions(percentile_fractions)
            .call()
            .await?;
        info!("Retrieved {} series", a5_series.len());

        let mut stations = stations;
        let mut series = SeriesTable::from_a5_series(&a5_series);
        stations.set_original_station_id();
        series.set_original_station_id();
        stations.sort();
        series.sort();

        let tables = FewsTableSet {
            groups: series.group_by_variable(false),
            stations,
            series,
        };
        tables.write_csv(&output_dir, "INA_")?;
        Ok(tables)
    }
}

async fn ensure_output_dir(path: &Path) -> Result<(), FewsMetadataError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| FewsMetadataError::OutputDirCreation(path.to_path_buf(), e))
}
