//! Delirium-day labeling.
//!
//! Streams the flowsheet extract for a cohort's encounters, normalizes the
//! CAM assessment strings through an explicit categorical map, and aligns
//! each assessment to the index procedure: `day = days_from_dob - offset`.
//! Assessments without an alignment row are dropped, never given an
//! invented offset.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use compass::{ExtractKind, catalog, stream_extract};
use recordstore::typed::{insert_records, read_filtered_as};
use recordstore::{Predicate, Record, RecordStore};

use arrow::record_batch::RecordBatch;

use crate::driver::{CohortProcedureKey, Derivation, missing_keys};
use crate::error::CohortError;
use crate::model::{Alignment, Assessment, CohortEncounter, CohortProcedure, DeliriumDay};
use crate::transform::{
    CategoricalMap, rename_columns, required_column, value_i64, value_string,
};

const RENAME: &[(&str, &str)] = &[
    ("flowsheet_time", "time"),
    ("flowsheet_value", "value"),
    ("flowsheet_days_since_birth", "days_from_dob"),
];

/// The CAM free-text vocabulary. Anything else (including the empty string)
/// is missing and drops its row.
pub fn assessment_map() -> CategoricalMap<Assessment> {
    CategoricalMap::from_pairs([
        ("Delirious- CAM+", Assessment::Y),
        ("Not delirious- CAM-", Assessment::N),
        ("Unable to assess", Assessment::U),
    ])
}

/// Normalize one raw flowsheet batch into delirium-day rows for one
/// (cohort, procedure) key, inner-joining `offsets` on encounter id.
pub fn batch_to_delirium(
    batch: &RecordBatch,
    key: &CohortProcedureKey,
    offsets: &HashMap<i64, i64>,
    map: &CategoricalMap<Assessment>,
) -> Result<Vec<DeliriumDay>, CohortError> {
    let batch = rename_columns(batch, RENAME)?;
    let encounters = required_column(&batch, "encounter_id")?;
    let times = required_column(&batch, "time")?;
    let values = required_column(&batch, "value")?;
    let days = required_column(&batch, "days_from_dob")?;

    let mut rows = Vec::new();
    for i in 0..batch.num_rows() {
        let Some(encounter_id) = value_i64(encounters, i) else {
            continue;
        };
        let Some(days_from_dob) = value_i64(days, i) else {
            continue;
        };
        let Some(time) = value_string(times, i).filter(|t| !t.is_empty()) else {
            continue;
        };
        let Some(assessment) = value_string(values, i).and_then(|v| map.get(&v)) else {
            continue;
        };
        // Inner-join semantics: no alignment row, no derived day.
        let Some(offset) = offsets.get(&encounter_id) else {
            continue;
        };
        rows.push(DeliriumDay {
            cohort_id: key.cohort_id.clone(),
            procedure: key.procedure.clone(),
            encounter_id,
            days_from_dob,
            day: days_from_dob - offset,
            time,
            assessment,
        });
    }
    Ok(rows)
}

/// Populates delirium-day labels, one (cohort, procedure) at a time.
pub struct DeliriumDerivation {
    pub batch_size: usize,
}

#[async_trait]
impl Derivation for DeliriumDerivation {
    type Key = CohortProcedureKey;

    fn table(&self) -> String {
        DeliriumDay::TABLE.to_string()
    }

    async fn pending_keys(
        &self,
        store: &dyn RecordStore,
    ) -> Result<Vec<CohortProcedureKey>, CohortError> {
        let domain: Vec<CohortProcedureKey> =
            read_filtered_as::<CohortProcedure>(store, &Predicate::all())
                .await?
                .into_iter()
                .map(|p| CohortProcedureKey {
                    cohort_id: p.cohort_id,
                    procedure: p.procedure,
                })
                .collect();
        let existing: HashSet<CohortProcedureKey> =
            read_filtered_as::<DeliriumDay>(store, &Predicate::all())
                .await?
                .into_iter()
                .map(|d| CohortProcedureKey {
                    cohort_id: d.cohort_id,
                    procedure: d.procedure,
                })
                .collect();
        Ok(missing_keys(domain, &existing))
    }

    async fn make(
        &self,
        store: &dyn RecordStore,
        key: &CohortProcedureKey,
    ) -> Result<usize, CohortError> {
        // The cohort's encounters carry the subject-allowlist restriction.
        let encounters: Vec<CohortEncounter> = read_filtered_as(
            store,
            &Predicate::all()
                .and_in("cohort_id", [key.cohort_id.as_str()])
                .and_in("procedure", [key.procedure.as_str()]),
        )
        .await?;
        if encounters.is_empty() {
            return Ok(0);
        }
        let encounter_ids: Vec<i64> = encounters.iter().map(|e| e.encounter_id).collect();

        let aligned: Vec<Alignment> = read_filtered_as(
            store,
            &Predicate::all()
                .and_in("procedure", [key.procedure.as_str()])
                .and_in("encounter_id", encounter_ids.iter().copied()),
        )
        .await?;
        let offsets: HashMap<i64, i64> = aligned
            .into_iter()
            .map(|a| (a.encounter_id, a.offset))
            .collect();
        if offsets.is_empty() {
            return Ok(0);
        }

        let path = catalog::extract_path(store, ExtractKind::Flowsheet).await?;
        let predicate = Predicate::all().and_in("encounter_id", encounter_ids.iter().copied());
        let map = assessment_map();

        let mut inserted = 0;
        for batch in stream_extract(&path, predicate, self.batch_size)? {
            let rows = batch_to_delirium(&batch?, key, &offsets, &map)?;
            inserted += insert_records(store, &rows).await?;
        }
        Ok(inserted)
    }
}
