//! Cohort-encounter materialization.
//!
//! Projects the alignment table into per-cohort encounter rows: every
//! encounter whose index procedure the cohort names, restricted to the
//! cohort's subject allowlist when one was registered.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::StreamExt;
use recordstore::typed::{from_batch, insert_records, read_filtered_as};
use recordstore::{Predicate, Record, RecordStore};

use crate::driver::{CohortProcedureKey, Derivation, missing_keys};
use crate::error::CohortError;
use crate::model::{Alignment, Cohort, CohortEncounter, CohortProcedure};

pub struct EncounterDerivation {
    pub batch_size: usize,
}

pub(crate) async fn fetch_cohort(
    store: &dyn RecordStore,
    cohort_id: &str,
) -> Result<Cohort, CohortError> {
    let rows: Vec<Cohort> =
        read_filtered_as(store, &Predicate::all().and_in("cohort_id", [cohort_id])).await?;
    rows.into_iter()
        .next()
        .ok_or_else(|| CohortError::CohortNotFound {
            cohort_id: cohort_id.to_string(),
        })
}

#[async_trait]
impl Derivation for EncounterDerivation {
    type Key = CohortProcedureKey;

    fn table(&self) -> String {
        CohortEncounter::TABLE.to_string()
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
            read_filtered_as::<CohortEncounter>(store, &Predicate::all())
                .await?
                .into_iter()
                .map(|e| CohortProcedureKey {
                    cohort_id: e.cohort_id,
                    procedure: e.procedure,
                })
                .collect();
        Ok(missing_keys(domain, &existing))
    }

    async fn make(
        &self,
        store: &dyn RecordStore,
        key: &CohortProcedureKey,
    ) -> Result<usize, CohortError> {
        let cohort = fetch_cohort(store, &key.cohort_id).await?;

        let mut predicate = Predicate::all().and_in("procedure", [key.procedure.as_str()]);
        if let Some(subject_ids) = &cohort.subject_ids {
            predicate = predicate.and_in("subject_id", subject_ids.iter().copied());
        }

        let mut stream = store
            .read_batches(Alignment::TABLE, &predicate, self.batch_size)
            .await?;
        let mut inserted = 0;
        while let Some(batch) = stream.next().await {
            let aligned: Vec<Alignment> = from_batch(&batch?)?;
            let rows: Vec<CohortEncounter> = aligned
                .into_iter()
                .map(|a| CohortEncounter {
                    cohort_id: key.cohort_id.clone(),
                    encounter_id: a.encounter_id,
                    procedure: a.procedure,
                    subject_id: a.subject_id,
                })
                .collect();
            inserted += insert_records(store, &rows).await?;
        }
        Ok(inserted)
    }
}
