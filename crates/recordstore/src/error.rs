// Error types for record store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("table not found: {table}")]
    TableNotFound { table: String },

    #[error("column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("schema mismatch for table {table}: {message}")]
    SchemaMismatch { table: String, message: String },

    #[error("unsupported key type in column {column}: {data_type}")]
    KeyType { column: String, data_type: String },

    #[error("null primary key value in column {column}")]
    NullKey { column: String },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_arrow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
