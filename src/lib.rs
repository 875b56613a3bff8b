mod a5;
mod error;
mod fews;
mod fews_metadata;
mod subbasin;
mod timestep;
mod whos;

pub use error::FewsMetadataError;
pub use fews_metadata::*;

pub use whos::client::{WhosClient, WhosConfig};
pub use whos::error::WhosError;
pub use whos::models::*;

pub use a5::client::{A5Client, A5Config};
pub use a5::error::A5Error;
pub use a5::models::*;

pub use fews::columns::{
    monthly_threshold_column, order_threshold_columns, percentile_column, MONTHLY_STATS,
    MONTH_ABBREVS, SERIES_BASE_COLUMNS, STAGE_THRESHOLD_COLUMNS, STATION_COLUMNS,
};
pub use fews::error::TableError;
pub use fews::read_fews_csv;
pub use fews::series_table::{
    fews_variable_code, organizations_from_timeseries, SeriesRow, SeriesTable,
};
pub use fews::station_table::{original_station_id, StationRow, StationTable};

pub use subbasin::{SubBasinError, SubBasinIndex};
pub use timestep::{interval_to_hours, iso_duration_to_hours, TimestepError};
