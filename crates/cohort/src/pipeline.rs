//! Caller-facing pipeline API.
//!
//! A [`CohortPipeline`] owns a store handle and a batch size, and exposes
//! the three operations callers use: idempotent cohort registration,
//! materialization of derived tables to exhaustion, and read-only cohort
//! snapshots. Every component receives the store handle explicitly; there is
//! no global connection state.

use std::collections::HashSet;
use std::sync::Arc;

use compass::{ExtractFile, ExtractKind, catalog};
use diagnostics::*;
use recordstore::typed::{
    ensure_table_for, ensure_table_named, insert_records, read_filtered_as,
};
use recordstore::{Predicate, RecordStore};

use crate::alignment::AlignmentDerivation;
use crate::delirium::DeliriumDerivation;
use crate::driver::{DEFAULT_BATCH_SIZE, Driver, MaterializeReport};
use crate::encounters::{EncounterDerivation, fetch_cohort};
use crate::error::CohortError;
use crate::model::{Alignment, Cohort, CohortEncounter, CohortProcedure, DeliriumDay, OutcomeEvent};
use crate::names::{LabName, LabNameDerivation, ProcedureName, ProcedureNameDerivation};
use crate::outcomes::{OutcomeDef, OutcomeDerivation, standard_outcomes};

/// Arguments to cohort registration.
#[derive(Debug, Clone)]
pub struct CohortSpec {
    pub owner: String,
    pub name: String,
    pub procedures: Vec<String>,
    pub description: Option<String>,
    pub subject_ids: Option<Vec<i64>>,
}

/// Which derived layer to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeTarget {
    Names,
    Alignment,
    Encounters,
    Delirium,
    Outcomes,
    All,
}

impl std::str::FromStr for MaterializeTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "names" => Ok(MaterializeTarget::Names),
            "alignment" => Ok(MaterializeTarget::Alignment),
            "encounters" => Ok(MaterializeTarget::Encounters),
            "delirium" => Ok(MaterializeTarget::Delirium),
            "outcomes" => Ok(MaterializeTarget::Outcomes),
            "all" => Ok(MaterializeTarget::All),
            other => Err(format!(
                "unknown target '{other}' (expected names|alignment|encounters|delirium|outcomes|all)"
            )),
        }
    }
}

/// Read-only projection of one cohort's derived state.
#[derive(Debug, Clone)]
pub struct CohortSnapshot {
    pub cohort: Cohort,
    pub procedures: Vec<CohortProcedure>,
    pub encounters: Vec<CohortEncounter>,
    pub alignment: Vec<Alignment>,
}

pub struct CohortPipeline {
    store: Arc<dyn RecordStore>,
    batch_size: usize,
    outcomes: Vec<OutcomeDef>,
}

impl CohortPipeline {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            outcomes: standard_outcomes(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_outcomes(mut self, outcomes: Vec<OutcomeDef>) -> Self {
        self.outcomes = outcomes;
        self
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn outcome_defs(&self) -> &[OutcomeDef] {
        &self.outcomes
    }

    /// Register every table this pipeline reads or writes. Idempotent.
    pub async fn ensure_tables(&self) -> Result<(), CohortError> {
        let store = self.store.as_ref();
        ensure_table_for::<ExtractFile>(store).await?;
        ensure_table_for::<ProcedureName>(store).await?;
        ensure_table_for::<LabName>(store).await?;
        ensure_table_for::<Cohort>(store).await?;
        ensure_table_for::<CohortProcedure>(store).await?;
        ensure_table_for::<CohortEncounter>(store).await?;
        ensure_table_for::<Alignment>(store).await?;
        ensure_table_for::<DeliriumDay>(store).await?;
        for def in &self.outcomes {
            ensure_table_named::<OutcomeEvent>(store, &def.table()).await?;
        }
        Ok(())
    }

    /// Register a raw extract file backing one extract kind.
    pub async fn register_extract(
        &self,
        kind: ExtractKind,
        version: i64,
        path: impl Into<String>,
    ) -> Result<bool, CohortError> {
        self.ensure_tables().await?;
        Ok(catalog::register(
            self.store.as_ref(),
            &ExtractFile {
                kind,
                version,
                path: path.into(),
            },
        )
        .await?)
    }

    /// Register a cohort and its procedure children. Registering the same
    /// owner and name twice is a no-op returning the existing id.
    pub async fn register_cohort(&self, spec: CohortSpec) -> Result<String, CohortError> {
        if spec.owner.is_empty() || spec.name.is_empty() {
            return Err(CohortError::InvalidCohort {
                message: "owner and name must be non-empty".to_string(),
            });
        }
        if spec.procedures.is_empty() {
            return Err(CohortError::InvalidCohort {
                message: "at least one procedure is required".to_string(),
            });
        }
        self.ensure_tables().await?;
        let store = self.store.as_ref();

        let cohort_id = format!("{}/{}", spec.owner, spec.name);
        let existing: Vec<Cohort> = read_filtered_as(
            store,
            &Predicate::all().and_in("cohort_id", [cohort_id.as_str()]),
        )
        .await?;
        if !existing.is_empty() {
            debug!("cohort {cohort_id} already registered");
            return Ok(cohort_id);
        }

        let mut procedures = Vec::new();
        let mut seen = HashSet::new();
        for procedure in &spec.procedures {
            if seen.insert(procedure.clone()) {
                procedures.push(procedure.clone());
            }
        }

        let cohort = Cohort {
            cohort_id: cohort_id.clone(),
            owner: spec.owner,
            name: spec.name,
            subject_ids: spec.subject_ids,
            procedures: procedures.clone(),
            description: spec.description,
            created_at: chrono::Utc::now().timestamp_micros(),
        };
        insert_records(store, std::slice::from_ref(&cohort)).await?;

        let children: Vec<CohortProcedure> = procedures
            .into_iter()
            .map(|procedure| CohortProcedure {
                cohort_id: cohort_id.clone(),
                procedure,
            })
            .collect();
        insert_records(store, &children).await?;

        let count = children.len();
        info!("registered cohort {cohort_id} with {count} procedures");
        Ok(cohort_id)
    }

    /// Run the derivation drivers for `target` over all pending keys.
    pub async fn materialize(
        &self,
        target: MaterializeTarget,
    ) -> Result<MaterializeReport, CohortError> {
        self.ensure_tables().await?;
        let store = self.store.as_ref();
        let driver = Driver::new(store);
        let mut report = MaterializeReport::default();

        if matches!(target, MaterializeTarget::Names | MaterializeTarget::All) {
            report.absorb(driver.materialize(&ProcedureNameDerivation).await?);
            report.absorb(driver.materialize(&LabNameDerivation).await?);
        }
        if matches!(target, MaterializeTarget::Alignment | MaterializeTarget::All) {
            report.absorb(
                driver
                    .materialize(&AlignmentDerivation {
                        batch_size: self.batch_size,
                    })
                    .await?,
            );
        }
        if matches!(target, MaterializeTarget::Encounters | MaterializeTarget::All) {
            report.absorb(
                driver
                    .materialize(&EncounterDerivation {
                        batch_size: self.batch_size,
                    })
                    .await?,
            );
        }
        if matches!(target, MaterializeTarget::Delirium | MaterializeTarget::All) {
            report.absorb(
                driver
                    .materialize(&DeliriumDerivation {
                        batch_size: self.batch_size,
                    })
                    .await?,
            );
        }
        if matches!(target, MaterializeTarget::Outcomes | MaterializeTarget::All) {
            for def in &self.outcomes {
                // Fresh instance per run: the event-index cache must not
                // outlive this materialization call.
                let derivation = OutcomeDerivation::new(def.clone());
                report.absorb(driver.materialize(&derivation).await?);
            }
        }

        let keys = report.keys_processed;
        let rows = report.rows_inserted;
        info!("materialize finished: {keys} keys, {rows} rows inserted");
        Ok(report)
    }

    /// Read-only projection of one cohort.
    pub async fn snapshot(&self, cohort_id: &str) -> Result<CohortSnapshot, CohortError> {
        self.ensure_tables().await?;
        let store = self.store.as_ref();
        let cohort = fetch_cohort(store, cohort_id).await?;

        let procedures: Vec<CohortProcedure> = read_filtered_as(
            store,
            &Predicate::all().and_in("cohort_id", [cohort_id]),
        )
        .await?;
        let encounters: Vec<CohortEncounter> = read_filtered_as(
            store,
            &Predicate::all().and_in("cohort_id", [cohort_id]),
        )
        .await?;

        let mut alignment_predicate = Predicate::all().and_in(
            "procedure",
            cohort.procedures.iter().map(|p| p.as_str()),
        );
        if let Some(subject_ids) = &cohort.subject_ids {
            alignment_predicate =
                alignment_predicate.and_in("subject_id", subject_ids.iter().copied());
        }
        let alignment: Vec<Alignment> =
            read_filtered_as(store, &alignment_predicate).await?;

        Ok(CohortSnapshot {
            cohort,
            procedures,
            encounters,
            alignment,
        })
    }

    /// All registered cohorts.
    pub async fn list_cohorts(&self) -> Result<Vec<Cohort>, CohortError> {
        self.ensure_tables().await?;
        Ok(read_filtered_as(self.store.as_ref(), &Predicate::all()).await?)
    }
}
