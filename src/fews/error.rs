use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("DataFrame operation failed")]
    Polars(#[from] PolarsError),

    #[error("Failed to write CSV file '{path}'")]
    CsvWriteIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write CSV file '{path}'")]
    CsvWritePolars {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("Failed to read CSV file '{path}'")]
    CsvRead {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
}
