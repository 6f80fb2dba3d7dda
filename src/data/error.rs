use std::path::PathBuf;

use thiserror::Error;

/// Canonical result for the data layer.
pub type Result<T> = std::result::Result<T, DataError>;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("Unsupported file type: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Unknown column: '{0}'")]
    UnknownColumn(String),

    #[error("No CSV member found in archive {}", archive.display())]
    NoTabularMember { archive: PathBuf },

    #[error("Filter has {columns} column names but {values} value specs")]
    FilterArity { columns: usize, values: usize },

    #[error("Filter values must be a sequence with one entry per column, got bare scalar {0}")]
    BareScalarFilter(String),

    #[error("Invalid filter value: {0}")]
    InvalidFilterValue(String),

    #[error("Schema error: {0}")]
    Schema(String),

    // Underlying failures pass through with their own message and source.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Pickle(#[from] serde_pickle::Error),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}
