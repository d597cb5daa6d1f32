//! Typed table definitions.
//!
//! Every stored table is declared as a Rust struct implementing [`Record`]:
//! the Arrow field list comes from [`ForArrow`], the table name and primary
//! key columns are associated constants. serde_arrow converts between item
//! slices and `RecordBatch`es, so table schemas are checked at compile time
//! rather than declared in strings.

use std::sync::Arc;

use arrow::datatypes::{FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::predicate::{Scalar, scalar_at};

/// Trait for converting data structures to Arrow schemas.
pub trait ForArrow {
    fn for_arrow() -> Vec<FieldRef>;
}

/// A typed record stored in a named table with a declared primary key.
pub trait Record: Serialize + DeserializeOwned + ForArrow {
    /// Default table name for this record type.
    const TABLE: &'static str;
    /// Primary key columns, a subset of the `for_arrow` field names.
    const KEY: &'static [&'static str];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(Self::for_arrow()))
    }
}

/// Extract the primary key of one row as a scalar tuple.
pub fn row_key(
    batch: &RecordBatch,
    key_columns: &[String],
    row: usize,
) -> Result<Vec<Scalar>, StoreError> {
    let mut key = Vec::with_capacity(key_columns.len());
    for column in key_columns {
        let array = batch
            .column_by_name(column)
            .ok_or_else(|| StoreError::ColumnNotFound {
                column: column.clone(),
            })?;
        match scalar_at(array, row).map_err(|e| match e {
            StoreError::KeyType { data_type, .. } => StoreError::KeyType {
                column: column.clone(),
                data_type,
            },
            other => other,
        })? {
            Some(scalar) => key.push(scalar),
            None => {
                return Err(StoreError::NullKey {
                    column: column.clone(),
                });
            }
        }
    }
    Ok(key)
}
