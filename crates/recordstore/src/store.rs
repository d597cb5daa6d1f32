//! The record store contract used by the derivation pipeline.

use std::pin::Pin;

use arrow::datatypes::FieldRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::Stream;

use crate::error::StoreError;
use crate::predicate::Predicate;

/// A lazy, finite, non-restartable sequence of row batches.
pub type BatchStream = Pin<Box<dyn Stream<Item = Result<RecordBatch, StoreError>> + Send>>;

/// Narrow interface to a tabular store with deduplicating insert.
///
/// Implementations must make `insert_many` atomic per-row with respect to
/// primary keys: a row whose key already exists is skipped silently, never
/// overwritten and never an error. That contract is the sole mechanism that
/// makes re-running a derivation safe.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Register a table if it does not exist yet. Idempotent.
    async fn ensure_table(
        &self,
        table: &str,
        fields: Vec<FieldRef>,
        key_columns: &[&str],
    ) -> Result<(), StoreError>;

    /// Read all rows matching `predicate` as a single batch. Intended for
    /// small lookups; use `read_batches` for large scans.
    async fn read_filtered(
        &self,
        table: &str,
        predicate: &Predicate,
    ) -> Result<RecordBatch, StoreError>;

    /// Stream rows matching `predicate` in chunks of at most
    /// `max_batch_size` rows, covering every matching row exactly once.
    async fn read_batches(
        &self,
        table: &str,
        predicate: &Predicate,
        max_batch_size: usize,
    ) -> Result<BatchStream, StoreError>;

    /// Insert rows, skipping any whose primary key already exists (including
    /// later duplicates within `batch` itself). Returns the number of rows
    /// actually inserted.
    async fn insert_many(&self, table: &str, batch: &RecordBatch) -> Result<usize, StoreError>;
}
