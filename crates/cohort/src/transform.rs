//! Per-batch normalization building blocks.
//!
//! Each derived-table kind composes these the same way: rename source
//! columns to canonical names, coerce designated fields with best-effort
//! numeric parsing, normalize categoricals through an explicit enumerated
//! map, then drop any row with a missing required field. A missing *column*
//! is a malformed source and an error; a missing *cell* only drops its row.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{FieldRef, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::CohortError;

/// Best-effort integer parse. Accepts integer and finite float renderings,
/// truncating floats toward zero; anything else is missing.
pub fn coerce_i64(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v as i64),
        _ => None,
    }
}

/// Read one cell as an integer, whatever the column was inferred as.
pub fn value_i64(array: &ArrayRef, row: usize) -> Option<i64> {
    if array.is_null(row) {
        return None;
    }
    if let Some(ints) = array.as_any().downcast_ref::<Int64Array>() {
        return Some(ints.value(row));
    }
    if let Some(floats) = array.as_any().downcast_ref::<Float64Array>() {
        let v = floats.value(row);
        return v.is_finite().then(|| v as i64);
    }
    if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
        return coerce_i64(strings.value(row));
    }
    None
}

/// Read one cell as a string; numeric cells render as their display form.
pub fn value_string(array: &ArrayRef, row: usize) -> Option<String> {
    if array.is_null(row) {
        return None;
    }
    if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
        return Some(strings.value(row).to_string());
    }
    if let Some(ints) = array.as_any().downcast_ref::<Int64Array>() {
        return Some(ints.value(row).to_string());
    }
    if let Some(floats) = array.as_any().downcast_ref::<Float64Array>() {
        return Some(floats.value(row).to_string());
    }
    None
}

/// Rename source columns to canonical derived-table names. Columns absent
/// from the mapping pass through unchanged.
pub fn rename_columns(
    batch: &RecordBatch,
    mapping: &[(&str, &str)],
) -> Result<RecordBatch, CohortError> {
    let fields: Vec<FieldRef> = batch
        .schema()
        .fields()
        .iter()
        .map(|field| {
            match mapping.iter().find(|(from, _)| field.name() == from) {
                Some((_, to)) => Arc::new(field.as_ref().clone().with_name(*to)),
                None => field.clone(),
            }
        })
        .collect();
    Ok(RecordBatch::try_new(
        Arc::new(Schema::new(fields)),
        batch.columns().to_vec(),
    )?)
}

/// Fetch a required column; absence means the source is malformed.
pub fn required_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a ArrayRef, CohortError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| CohortError::MissingField {
            column: name.to_string(),
        })
}

/// Explicit enumerated mapping for categorical normalization. Raw values
/// absent from the map are missing, never passed through.
pub struct CategoricalMap<V> {
    map: HashMap<String, V>,
}

impl<V: Clone> CategoricalMap<V> {
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            map: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        }
    }

    pub fn get(&self, raw: &str) -> Option<V> {
        self.map.get(raw).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field};

    #[test]
    fn coercion_accepts_ints_and_floats_only() {
        assert_eq!(coerce_i64("42"), Some(42));
        assert_eq!(coerce_i64(" 42 "), Some(42));
        assert_eq!(coerce_i64("42.0"), Some(42));
        assert_eq!(coerce_i64("42.9"), Some(42));
        assert_eq!(coerce_i64("-3"), Some(-3));
        assert_eq!(coerce_i64(""), None);
        assert_eq!(coerce_i64("n/a"), None);
        assert_eq!(coerce_i64("inf"), None);
    }

    #[test]
    fn cell_readers_cross_types() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("i", DataType::Int64, true),
            Field::new("f", DataType::Float64, true),
            Field::new("s", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(7), None])),
                Arc::new(Float64Array::from(vec![Some(7.5), Some(f64::NAN)])),
                Arc::new(StringArray::from(vec![Some("7"), Some("x")])),
            ],
        )
        .unwrap();

        assert_eq!(value_i64(batch.column(0), 0), Some(7));
        assert_eq!(value_i64(batch.column(0), 1), None);
        assert_eq!(value_i64(batch.column(1), 0), Some(7));
        assert_eq!(value_i64(batch.column(1), 1), None);
        assert_eq!(value_i64(batch.column(2), 0), Some(7));
        assert_eq!(value_i64(batch.column(2), 1), None);
        assert_eq!(value_string(batch.column(2), 1), Some("x".to_string()));
        assert_eq!(value_string(batch.column(0), 1), None);
    }

    #[test]
    fn rename_is_partial_and_preserves_data() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("flowsheet_time", DataType::Utf8, true),
            Field::new("encounter_id", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["08:00"])),
                Arc::new(Int64Array::from(vec![5])),
            ],
        )
        .unwrap();

        let renamed = rename_columns(&batch, &[("flowsheet_time", "time")]).unwrap();
        assert!(renamed.column_by_name("time").is_some());
        assert!(renamed.column_by_name("flowsheet_time").is_none());
        assert!(renamed.column_by_name("encounter_id").is_some());
        assert_eq!(renamed.num_rows(), 1);
    }

    #[test]
    fn categorical_map_rejects_unlisted_values() {
        let map = CategoricalMap::from_pairs([("yes", 1), ("no", 0)]);
        assert_eq!(map.get("yes"), Some(1));
        assert_eq!(map.get(""), None);
        assert_eq!(map.get("maybe"), None);
    }
}
