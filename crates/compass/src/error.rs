// Error types for extract ingestion
use std::path::PathBuf;

use crate::kind::ExtractKind;

#[derive(Debug, thiserror::Error)]
pub enum CompassError {
    #[error("extract file {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no {kind} extract registered")]
    MissingExtract { kind: ExtractKind },

    #[error("extract {path} has no column {column}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("unsupported extract format: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("unknown extract kind: {name}")]
    UnknownKind { name: String },

    #[error("catalog config error: {message}")]
    Config { message: String },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Store error: {0}")]
    Store(#[from] recordstore::StoreError),
}
