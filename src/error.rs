use std::path::PathBuf;

use thiserror::Error;

use crate::a5::error::A5Error;
use crate::fews::error::TableError;
use crate::subbasin::SubBasinError;
use crate::whos::error::WhosError;

#[derive(Debug, Error)]
pub enum FewsMetadataError {
    #[error(transparent)]
    Whos(#[from] WhosError),

    #[error(transparent)]
    A5(#[from] A5Error),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    SubBasin(#[from] SubBasinError),

    #[error("Failed to create output directory '{0}'")]
    OutputDirCreation(PathBuf, #[source] std::io::Error),
}
