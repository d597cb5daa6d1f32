//! Parquet-directory-backed record store.
//!
//! Wraps [`MemoryStore`] with an explicit durability lifecycle: each table is
//! loaded from `<root>/<table>.parquet` the first time it is registered, and
//! written back wholesale by [`ParquetStore::flush`]. Between open and flush
//! all reads and inserts are served from memory; the skip-on-conflict key set
//! is rebuilt from the loaded rows, so a reopened store keeps the same
//! idempotence guarantees.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::datatypes::FieldRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use diagnostics::*;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::predicate::Predicate;
use crate::store::{BatchStream, RecordStore};

pub struct ParquetStore {
    root: PathBuf,
    inner: MemoryStore,
    loaded: Mutex<HashSet<String>>,
}

impl ParquetStore {
    /// Open (or create) a store rooted at a directory of parquet files.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            inner: MemoryStore::new(),
            loaded: Mutex::new(HashSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all registered tables, sorted.
    pub async fn table_names(&self) -> Vec<String> {
        self.inner.table_names().await
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.parquet"))
    }

    /// Write every registered table back to its parquet file.
    pub async fn flush(&self) -> Result<(), StoreError> {
        for table in self.inner.table_names().await {
            let batch = self.inner.read_filtered(&table, &Predicate::all()).await?;
            let path = self.table_path(&table);
            let file = File::create(&path)?;
            let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
            writer.write(&batch)?;
            writer.close()?;
            let rows = batch.num_rows();
            debug!("flushed {rows} rows of {table}");
        }
        Ok(())
    }

    async fn load_if_present(&self, table: &str) -> Result<(), StoreError> {
        let mut loaded = self.loaded.lock().await;
        if !loaded.insert(table.to_string()) {
            return Ok(());
        }
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(());
        }
        let schema = self
            .inner
            .read_filtered(table, &Predicate::all())
            .await?
            .schema();
        let file = File::open(&path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let mut rows = 0;
        for batch in reader {
            let batch = batch?;
            // Re-anchor to the registered schema so later inserts concat cleanly.
            let batch = RecordBatch::try_new(schema.clone(), batch.columns().to_vec())?;
            rows += self.inner.insert_many(table, &batch).await?;
        }
        debug!("loaded {rows} rows of {table}");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for ParquetStore {
    async fn ensure_table(
        &self,
        table: &str,
        fields: Vec<FieldRef>,
        key_columns: &[&str],
    ) -> Result<(), StoreError> {
        self.inner.ensure_table(table, fields, key_columns).await?;
        self.load_if_present(table).await
    }

    async fn read_filtered(
        &self,
        table: &str,
        predicate: &Predicate,
    ) -> Result<RecordBatch, StoreError> {
        self.inner.read_filtered(table, predicate).await
    }

    async fn read_batches(
        &self,
        table: &str,
        predicate: &Predicate,
        max_batch_size: usize,
    ) -> Result<BatchStream, StoreError> {
        self.inner.read_batches(table, predicate, max_batch_size).await
    }

    async fn insert_many(&self, table: &str, batch: &RecordBatch) -> Result<usize, StoreError> {
        self.inner.insert_many(table, batch).await
    }
}
