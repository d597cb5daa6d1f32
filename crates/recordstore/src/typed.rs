//! Typed sugar over the record store.
//!
//! Free functions rather than trait methods so they stay usable through
//! `&dyn RecordStore` handles.

use arrow::record_batch::RecordBatch;

use crate::error::StoreError;
use crate::predicate::Predicate;
use crate::schema::Record;
use crate::store::RecordStore;

/// Register `T`'s table under its default name.
pub async fn ensure_table_for<T: Record>(store: &dyn RecordStore) -> Result<(), StoreError> {
    store.ensure_table(T::TABLE, T::for_arrow(), T::KEY).await
}

/// Register `T`'s schema under an explicit table name (outcome tables share
/// one record type across several tables).
pub async fn ensure_table_named<T: Record>(
    store: &dyn RecordStore,
    table: &str,
) -> Result<(), StoreError> {
    store.ensure_table(table, T::for_arrow(), T::KEY).await
}

/// Serialize items to a record batch with `T`'s schema.
pub fn to_batch<T: Record>(items: &[T]) -> Result<RecordBatch, StoreError> {
    Ok(serde_arrow::to_record_batch(&T::for_arrow(), &items)?)
}

/// Deserialize every row of a batch into `T`.
pub fn from_batch<T: Record>(batch: &RecordBatch) -> Result<Vec<T>, StoreError> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }
    Ok(serde_arrow::from_record_batch(batch)?)
}

/// Insert typed records into `T`'s default table, skipping existing keys.
pub async fn insert_records<T: Record + Sync>(
    store: &dyn RecordStore,
    items: &[T],
) -> Result<usize, StoreError> {
    insert_records_into(store, T::TABLE, items).await
}

/// Insert typed records into an explicitly named table.
pub async fn insert_records_into<T: Record + Sync>(
    store: &dyn RecordStore,
    table: &str,
    items: &[T],
) -> Result<usize, StoreError> {
    if items.is_empty() {
        return Ok(0);
    }
    let batch = to_batch(items)?;
    store.insert_many(table, &batch).await
}

/// Read rows matching `predicate` from `T`'s default table.
pub async fn read_filtered_as<T: Record>(
    store: &dyn RecordStore,
    predicate: &Predicate,
) -> Result<Vec<T>, StoreError> {
    read_filtered_as_from(store, T::TABLE, predicate).await
}

/// Read rows matching `predicate` from an explicitly named table.
pub async fn read_filtered_as_from<T: Record>(
    store: &dyn RecordStore,
    table: &str,
    predicate: &Predicate,
) -> Result<Vec<T>, StoreError> {
    let batch = store.read_filtered(table, predicate).await?;
    from_batch(&batch)
}
