//! The derivation driver: incremental materialization to exhaustion.
//!
//! A [`Derivation`] names a derived table, resolves the keys still missing
//! from it, and knows how to compute and insert all rows for one key. The
//! [`Driver`] runs pending keys in sequence; because every insert is
//! skip-on-conflict, a failed run leaves its key pending and the next run
//! only adds the rows that are still missing.

use std::collections::HashSet;
use std::hash::Hash;

use async_trait::async_trait;
use diagnostics::*;
use recordstore::RecordStore;

use crate::error::CohortError;

/// Default maximum rows per streamed batch.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// One incremental derived-table computation.
#[async_trait]
pub trait Derivation: Send + Sync {
    type Key: std::fmt::Display + Clone + Send + Sync;

    /// Derived table this populates, for reporting.
    fn table(&self) -> String;

    /// Candidate key domain minus keys already represented in the derived
    /// table. Computed fresh on every call; upstream content may have grown
    /// since the last run.
    async fn pending_keys(&self, store: &dyn RecordStore)
    -> Result<Vec<Self::Key>, CohortError>;

    /// Stream, transform and insert every row for one key. Returns the
    /// number of rows actually inserted.
    async fn make(&self, store: &dyn RecordStore, key: &Self::Key)
    -> Result<usize, CohortError>;
}

/// Outcome of one materialization run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeReport {
    pub keys_processed: usize,
    pub rows_inserted: usize,
}

impl MaterializeReport {
    pub fn absorb(&mut self, other: MaterializeReport) {
        self.keys_processed += other.keys_processed;
        self.rows_inserted += other.rows_inserted;
    }
}

/// Runs derivations against one store handle.
pub struct Driver<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> Driver<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self { store }
    }

    /// Materialize a derivation over all currently-pending keys.
    ///
    /// Keys run in arbitrary order. Any error aborts the whole call: rows
    /// already inserted for the failing key persist, the key itself stays
    /// pending, and the next invocation retries it whole.
    pub async fn materialize<D: Derivation>(
        &self,
        derivation: &D,
    ) -> Result<MaterializeReport, CohortError> {
        let table = derivation.table();
        let keys = derivation.pending_keys(self.store).await?;
        let pending = keys.len();
        if pending == 0 {
            debug!("{table}: nothing pending");
            return Ok(MaterializeReport::default());
        }
        info!("{table}: {pending} pending keys");

        let mut report = MaterializeReport::default();
        for key in &keys {
            let rows = derivation.make(self.store, key).await?;
            report.keys_processed += 1;
            report.rows_inserted += rows;
            let key = key.to_string();
            debug!("{table}: {key} inserted {rows} rows");
        }

        let inserted = report.rows_inserted;
        info!("{table}: inserted {inserted} rows over {pending} keys");
        Ok(report)
    }
}

/// Key source resolution: the candidate domain minus existing keys, with
/// in-domain duplicates collapsed. Pure; order follows the domain.
pub fn missing_keys<K>(domain: impl IntoIterator<Item = K>, existing: &HashSet<K>) -> Vec<K>
where
    K: Eq + Hash + Clone,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for key in domain {
        if !existing.contains(&key) && seen.insert(key.clone()) {
            out.push(key);
        }
    }
    out
}

/// (cohort, procedure) derivation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CohortProcedureKey {
    pub cohort_id: String,
    pub procedure: String,
}

impl std::fmt::Display for CohortProcedureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.cohort_id, self.procedure)
    }
}

/// (cohort, encounter, procedure) derivation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncounterKey {
    pub cohort_id: String,
    pub encounter_id: i64,
    pub procedure: String,
}

impl std::fmt::Display for EncounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{} ({})",
            self.cohort_id, self.encounter_id, self.procedure
        )
    }
}
