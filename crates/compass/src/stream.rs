//! Bounded streaming over raw extract files.
//!
//! [`stream_extract`] yields predicate-filtered record batches of at most
//! `batch_size` rows, reading the underlying file incrementally so peak
//! memory stays proportional to the batch size no matter how large the
//! extract is. The sequence is lazy, finite and non-restartable; every
//! matching row is produced exactly once.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use arrow_csv::reader::Format;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use recordstore::Predicate;

use crate::error::CompassError;

type RawBatches = Box<dyn Iterator<Item = Result<RecordBatch, arrow_schema::ArrowError>> + Send>;

pub struct ExtractBatches {
    predicate: Predicate,
    inner: RawBatches,
}

impl std::fmt::Debug for ExtractBatches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `inner` is a boxed trait object and cannot be formatted; omit it.
        f.debug_struct("ExtractBatches")
            .field("predicate", &self.predicate)
            .finish_non_exhaustive()
    }
}

impl Iterator for ExtractBatches {
    type Item = Result<RecordBatch, CompassError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Err(e) => return Some(Err(e.into())),
                Ok(batch) => match self.predicate.apply(&batch) {
                    Err(e) => return Some(Err(e.into())),
                    Ok(kept) if kept.num_rows() > 0 => return Some(Ok(kept)),
                    Ok(_) => continue,
                },
            }
        }
    }
}

fn open(path: &Path) -> Result<File, CompassError> {
    File::open(path).map_err(|source| CompassError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Stream an extract file as filtered batches of at most `batch_size` rows.
pub fn stream_extract(
    path: impl AsRef<Path>,
    predicate: Predicate,
    batch_size: usize,
) -> Result<ExtractBatches, CompassError> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let inner: RawBatches = match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => {
            let format = Format::default().with_header(true);
            let (schema, _) = format.infer_schema(open(&path)?, None)?;
            let reader = arrow_csv::ReaderBuilder::new(Arc::new(schema))
                .with_header(true)
                .with_batch_size(batch_size)
                .build(open(&path)?)?;
            Box::new(reader)
        }
        Some("parquet") => {
            let reader = ParquetRecordBatchReaderBuilder::try_new(open(&path)?)?
                .with_batch_size(batch_size)
                .build()?;
            Box::new(reader)
        }
        _ => return Err(CompassError::UnsupportedFormat { path }),
    };
    Ok(ExtractBatches { predicate, inner })
}
