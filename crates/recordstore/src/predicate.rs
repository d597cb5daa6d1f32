//! Set-membership predicates over record batches.
//!
//! A [`Predicate`] is a conjunction of `column IN {values}` clauses. It is the
//! only filter shape the store exposes: callers compose a procedure-name
//! clause with a subject-id clause by chaining [`Predicate::and_in`].

use std::collections::HashSet;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;

use crate::error::StoreError;

/// A scalar value usable in predicate sets and primary keys.
///
/// Floating-point columns are admitted by conversion: an integral `f64` cell
/// compares as its `i64` value, anything fractional never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    Utf8(String),
    Int64(i64),
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Utf8(s) => write!(f, "{}", s),
            Scalar::Int64(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Utf8(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Utf8(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int64(value)
    }
}

/// Read one cell as a [`Scalar`], for key extraction and membership tests.
///
/// Returns `Ok(None)` for null cells and for non-integral floats.
pub fn scalar_at(array: &ArrayRef, row: usize) -> Result<Option<Scalar>, StoreError> {
    if array.is_null(row) {
        return Ok(None);
    }
    if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
        return Ok(Some(Scalar::Utf8(strings.value(row).to_string())));
    }
    if let Some(ints) = array.as_any().downcast_ref::<Int64Array>() {
        return Ok(Some(Scalar::Int64(ints.value(row))));
    }
    if let Some(floats) = array.as_any().downcast_ref::<Float64Array>() {
        let v = floats.value(row);
        if v.is_finite() && v.fract() == 0.0 {
            return Ok(Some(Scalar::Int64(v as i64)));
        }
        return Ok(None);
    }
    Err(StoreError::KeyType {
        column: String::new(),
        data_type: format!("{:?}", array.data_type()),
    })
}

#[derive(Debug, Clone)]
struct InSet {
    column: String,
    values: HashSet<Scalar>,
}

/// Conjunction of set-membership clauses. An empty predicate matches all rows.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    clauses: Vec<InSet>,
}

impl Predicate {
    /// The predicate matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// AND a `column IN {values}` clause onto this predicate.
    pub fn and_in<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        self.clauses.push(InSet {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn is_trivial(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Compute the row-selection mask for a batch.
    pub fn mask(&self, batch: &RecordBatch) -> Result<BooleanArray, StoreError> {
        let mut keep = vec![true; batch.num_rows()];
        for clause in &self.clauses {
            let column = batch.column_by_name(&clause.column).ok_or_else(|| {
                StoreError::ColumnNotFound {
                    column: clause.column.clone(),
                }
            })?;
            for (row, flag) in keep.iter_mut().enumerate() {
                if *flag {
                    *flag = match scalar_at(column, row).map_err(|e| match e {
                        StoreError::KeyType { data_type, .. } => StoreError::KeyType {
                            column: clause.column.clone(),
                            data_type,
                        },
                        other => other,
                    })? {
                        Some(scalar) => clause.values.contains(&scalar),
                        None => false,
                    };
                }
            }
        }
        Ok(BooleanArray::from(keep))
    }

    /// Return the subset of `batch` rows matching this predicate.
    pub fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, StoreError> {
        if self.is_trivial() {
            return Ok(batch.clone());
        }
        let mask = self.mask(batch)?;
        Ok(arrow::compute::filter_record_batch(batch, &mask)?)
    }
}
