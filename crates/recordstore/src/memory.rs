//! In-memory record store.
//!
//! The reference implementation of [`RecordStore`]: tables are held as
//! accumulated record batches plus a primary-key set used to implement
//! skip-on-conflict insertion. Suitable for tests and single-run pipelines;
//! [`crate::parquet_store::ParquetStore`] adds durability on top of it.

use std::collections::{HashMap, HashSet};

use arrow::compute::concat_batches;
use arrow::datatypes::{FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use diagnostics::*;
use futures::stream;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::predicate::{Predicate, Scalar};
use crate::schema::row_key;
use crate::store::{BatchStream, RecordStore};

struct TableState {
    schema: SchemaRef,
    key_columns: Vec<String>,
    batches: Vec<RecordBatch>,
    keys: HashSet<Vec<Scalar>>,
}

impl TableState {
    fn filtered(&self, predicate: &Predicate) -> Result<Vec<RecordBatch>, StoreError> {
        let mut out = Vec::new();
        for batch in &self.batches {
            let kept = predicate.apply(batch)?;
            if kept.num_rows() > 0 {
                out.push(kept);
            }
        }
        Ok(out)
    }
}

/// Record store backed by process memory.
pub struct MemoryStore {
    tables: Mutex<HashMap<String, TableState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Names of all registered tables, sorted.
    pub async fn table_names(&self) -> Vec<String> {
        let tables = self.tables.lock().await;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_field_names(table: &str, expected: &SchemaRef, batch: &RecordBatch) -> Result<(), StoreError> {
    let expected_names: Vec<&str> = expected.fields().iter().map(|f| f.name().as_str()).collect();
    let actual_schema = batch.schema();
    let actual_names: Vec<&str> = actual_schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect();
    if expected_names != actual_names {
        return Err(StoreError::SchemaMismatch {
            table: table.to_string(),
            message: format!("expected columns {:?}, got {:?}", expected_names, actual_names),
        });
    }
    Ok(())
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ensure_table(
        &self,
        table: &str,
        fields: Vec<FieldRef>,
        key_columns: &[&str],
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.contains_key(table) {
            return Ok(());
        }
        let schema: SchemaRef = Arc::new(Schema::new(fields));
        for key in key_columns {
            if schema.column_with_name(key).is_none() {
                return Err(StoreError::ColumnNotFound {
                    column: (*key).to_string(),
                });
            }
        }
        tables.insert(
            table.to_string(),
            TableState {
                schema,
                key_columns: key_columns.iter().map(|k| k.to_string()).collect(),
                batches: Vec::new(),
                keys: HashSet::new(),
            },
        );
        Ok(())
    }

    async fn read_filtered(
        &self,
        table: &str,
        predicate: &Predicate,
    ) -> Result<RecordBatch, StoreError> {
        let tables = self.tables.lock().await;
        let state = tables.get(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;
        let filtered = state.filtered(predicate)?;
        if filtered.is_empty() {
            return Ok(RecordBatch::new_empty(state.schema.clone()));
        }
        Ok(concat_batches(&state.schema, &filtered)?)
    }

    async fn read_batches(
        &self,
        table: &str,
        predicate: &Predicate,
        max_batch_size: usize,
    ) -> Result<BatchStream, StoreError> {
        let tables = self.tables.lock().await;
        let state = tables.get(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;
        let max_batch_size = max_batch_size.max(1);
        let filtered = state.filtered(predicate)?;
        let mut chunks: Vec<Result<RecordBatch, StoreError>> = Vec::new();
        if !filtered.is_empty() {
            let all = concat_batches(&state.schema, &filtered)?;
            let mut offset = 0;
            while offset < all.num_rows() {
                let len = max_batch_size.min(all.num_rows() - offset);
                chunks.push(Ok(all.slice(offset, len)));
                offset += len;
            }
        }
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn insert_many(&self, table: &str, batch: &RecordBatch) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock().await;
        let state = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })?;
        check_field_names(table, &state.schema, batch)?;

        // First row with a given key wins; rows whose key is already stored,
        // or already seen earlier in this same batch, are skipped.
        let mut keep = Vec::with_capacity(batch.num_rows());
        let mut inserted = 0;
        for row in 0..batch.num_rows() {
            let key = row_key(batch, &state.key_columns, row)?;
            let fresh = state.keys.insert(key);
            if fresh {
                inserted += 1;
            }
            keep.push(fresh);
        }
        if inserted > 0 {
            let mask = arrow::array::BooleanArray::from(keep);
            let kept = arrow::compute::filter_record_batch(batch, &mask)?;
            state.batches.push(kept);
        }
        let total = batch.num_rows();
        debug!("insert into {table}: {inserted} of {total} rows");
        Ok(inserted)
    }
}
