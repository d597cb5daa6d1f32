//! In-memory columnar view of one raw extract.
//!
//! A [`SourceTable`] loads a delimited or columnar file wholesale and
//! supports set-membership filtering and re-chunking. Use it for small
//! lookups and cached working sets; for full-table scans prefer
//! [`crate::stream::stream_extract`], which never holds more than one batch.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow_csv::reader::Format;
use diagnostics::*;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use recordstore::{Predicate, Scalar, scalar_at};

use crate::error::CompassError;

// Chunk size used while loading; re-chunking for consumers happens in
// to_batches.
const READ_BATCH_SIZE: usize = 8192;

#[derive(Debug)]
pub struct SourceTable {
    path: PathBuf,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl SourceTable {
    /// Load a file, dispatching on its extension (`.csv` or `.parquet`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CompassError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Self::load_csv(path),
            Some("parquet") => Self::load_parquet(path),
            _ => Err(CompassError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self, CompassError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CompassError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        // Full-file inference: extract columns routinely degrade from numeric
        // to free text long after any sampled prefix.
        let format = Format::default().with_header(true);
        let (schema, _) = format.infer_schema(file, None)?;
        let schema = Arc::new(schema);

        let file = File::open(path).map_err(|source| CompassError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = arrow_csv::ReaderBuilder::new(schema.clone())
            .with_header(true)
            .with_batch_size(READ_BATCH_SIZE)
            .build(file)?;
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        let table = Self {
            path: path.to_path_buf(),
            schema,
            batches,
        };
        let rows = table.num_rows();
        let loaded = path.display().to_string();
        debug!("loaded {rows} rows from {loaded}");
        Ok(table)
    }

    pub fn load_parquet(path: impl AsRef<Path>) -> Result<Self, CompassError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CompassError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(READ_BATCH_SIZE);
        let schema = builder.schema().clone();
        let reader = builder.build()?;
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            path: path.to_path_buf(),
            schema,
            batches,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Subset of rows matching `predicate`, as a new table.
    pub fn filter(&self, predicate: &Predicate) -> Result<Self, CompassError> {
        let mut batches = Vec::new();
        for batch in &self.batches {
            let kept = predicate.apply(batch)?;
            if kept.num_rows() > 0 {
                batches.push(kept);
            }
        }
        Ok(Self {
            path: self.path.clone(),
            schema: self.schema.clone(),
            batches,
        })
    }

    /// Sugar for a single `column IN {values}` filter.
    pub fn filter_in<I, S>(&self, column: &str, values: I) -> Result<Self, CompassError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        self.filter(&Predicate::all().and_in(column, values))
    }

    /// All rows as one batch.
    pub fn concat(&self) -> Result<RecordBatch, CompassError> {
        if self.batches.is_empty() {
            return Ok(RecordBatch::new_empty(self.schema.clone()));
        }
        Ok(concat_batches(&self.schema, &self.batches)?)
    }

    /// Re-chunk into batches of at most `max_chunksize` rows.
    pub fn to_batches(&self, max_chunksize: usize) -> Result<Vec<RecordBatch>, CompassError> {
        let all = self.concat()?;
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < all.num_rows() {
            let len = max_chunksize.min(all.num_rows() - offset);
            out.push(all.slice(offset, len));
            offset += len;
        }
        Ok(out)
    }

    /// Distinct non-null, non-empty string values of one column, sorted.
    pub fn unique_strings(&self, column: &str) -> Result<BTreeSet<String>, CompassError> {
        let mut out = BTreeSet::new();
        for batch in &self.batches {
            let array = batch
                .column_by_name(column)
                .ok_or_else(|| CompassError::MissingColumn {
                    path: self.path.clone(),
                    column: column.to_string(),
                })?;
            for row in 0..batch.num_rows() {
                if let Some(scalar) = scalar_at(array, row)? {
                    let value = scalar.to_string();
                    if !value.is_empty() {
                        out.insert(value);
                    }
                }
            }
        }
        Ok(out)
    }
}
