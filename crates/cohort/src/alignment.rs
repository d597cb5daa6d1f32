//! Alignment derivation.
//!
//! For every procedure of interest, stream the procedure extract and record
//! the day offset of each (subject, encounter, procedure) event. The offset
//! anchors every downstream time series; it is clamped non-negative at this
//! single point so later subtraction can never see a negative anchor.

use std::collections::HashSet;

use async_trait::async_trait;
use compass::{ExtractKind, catalog, stream_extract};
use recordstore::typed::{insert_records, read_filtered_as};
use recordstore::{Predicate, Record, RecordStore};

use arrow::record_batch::RecordBatch;

use crate::driver::{Derivation, missing_keys};
use crate::error::CohortError;
use crate::model::{Alignment, CohortProcedure};
use crate::names::known_procedures;
use crate::transform::{rename_columns, required_column, value_i64, value_string};

const RENAME: &[(&str, &str)] = &[("days_from_dob_procstart", "offset")];

/// Normalize one raw procedure batch into alignment rows. Rows missing any
/// of subject, encounter, procedure or a parseable offset are dropped.
pub fn batch_to_alignments(batch: &RecordBatch) -> Result<Vec<Alignment>, CohortError> {
    let batch = rename_columns(batch, RENAME)?;
    let subjects = required_column(&batch, "person_id")?;
    let encounters = required_column(&batch, "encounter_id")?;
    let procedures = required_column(&batch, "order_name")?;
    let offsets = required_column(&batch, "offset")?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let Some(subject_id) = value_i64(subjects, i) else {
            continue;
        };
        let Some(encounter_id) = value_i64(encounters, i) else {
            continue;
        };
        let Some(procedure) = value_string(procedures, i).filter(|p| !p.is_empty()) else {
            continue;
        };
        let Some(offset) = value_i64(offsets, i) else {
            continue;
        };
        rows.push(Alignment {
            subject_id,
            encounter_id,
            procedure,
            offset: offset.max(0),
        });
    }
    Ok(rows)
}

/// Populates the alignment table, one procedure of interest at a time.
pub struct AlignmentDerivation {
    pub batch_size: usize,
}

#[async_trait]
impl Derivation for AlignmentDerivation {
    type Key = String;

    fn table(&self) -> String {
        Alignment::TABLE.to_string()
    }

    /// Domain: procedures that are both in the name dictionary and referenced
    /// by some cohort; a procedure is done once any alignment row names it.
    async fn pending_keys(&self, store: &dyn RecordStore) -> Result<Vec<String>, CohortError> {
        let known: HashSet<String> = known_procedures(store).await?.into_iter().collect();
        let wanted: Vec<CohortProcedure> = read_filtered_as(store, &Predicate::all()).await?;
        let domain = wanted
            .into_iter()
            .map(|p| p.procedure)
            .filter(|p| known.contains(p));

        let existing: HashSet<String> =
            read_filtered_as::<Alignment>(store, &Predicate::all())
                .await?
                .into_iter()
                .map(|a| a.procedure)
                .collect();
        Ok(missing_keys(domain, &existing))
    }

    async fn make(&self, store: &dyn RecordStore, key: &String) -> Result<usize, CohortError> {
        let path = catalog::extract_path(store, ExtractKind::Procedure).await?;
        let predicate = Predicate::all().and_in("order_name", [key.as_str()]);
        let mut inserted = 0;
        for batch in stream_extract(&path, predicate, self.batch_size)? {
            let rows = batch_to_alignments(&batch?)?;
            inserted += insert_records(store, &rows).await?;
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn malformed_rows_are_dropped_and_offsets_clamped() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("person_id", DataType::Int64, true),
            Field::new("encounter_id", DataType::Int64, true),
            Field::new("order_name", DataType::Utf8, true),
            Field::new("days_from_dob_procstart", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![
                    Some(1),
                    Some(2),
                    None,
                    Some(4),
                    Some(5),
                ])),
                Arc::new(Int64Array::from(vec![
                    Some(10),
                    Some(20),
                    Some(30),
                    Some(40),
                    Some(50),
                ])),
                Arc::new(StringArray::from(vec![
                    Some("CABG"),
                    Some("CABG"),
                    Some("CABG"),
                    Some("CABG"),
                    Some("CABG"),
                ])),
                Arc::new(StringArray::from(vec![
                    Some("9000"),
                    Some("not a number"),
                    Some("9002"),
                    Some("-3"),
                    Some("9004.0"),
                ])),
            ],
        )
        .unwrap();

        let rows = batch_to_alignments(&batch).unwrap();
        // Row 1 has an unparsable offset, row 2 a null subject.
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].offset, 9000);
        // Negative source offsets clamp to zero.
        assert_eq!(rows[1].offset, 0);
        assert_eq!(rows[2].offset, 9004);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "person_id",
            DataType::Int64,
            true,
        )]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        let err = batch_to_alignments(&batch).unwrap_err();
        assert!(matches!(err, CohortError::MissingField { .. }));
    }
}
