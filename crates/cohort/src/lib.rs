//! Incremental materialization of derived clinical-cohort tables.
//!
//! The core loop: resolve which upstream keys are missing from a derived
//! table, stream the upstream rows for each key in bounded batches,
//! normalize them (rename, coerce, categorical map, alignment join), and
//! append through a deduplicating insert. Re-running is always safe; failed
//! keys stay pending and are retried whole on the next run.
//!
//! Derived layers chain: alignment anchors each encounter to its index
//! procedure, delirium-day labels align CAM assessments to that anchor, and
//! outcome windows select qualifying events from the aligned days.

pub mod alignment;
pub mod cache;
pub mod delirium;
pub mod driver;
pub mod encounters;
pub mod error;
pub mod model;
pub mod names;
pub mod outcomes;
pub mod pipeline;
pub mod transform;

pub use cache::RunCache;
pub use driver::{
    CohortProcedureKey, DEFAULT_BATCH_SIZE, Derivation, Driver, EncounterKey, MaterializeReport,
    missing_keys,
};
pub use error::CohortError;
pub use model::{
    Alignment, Assessment, Cohort, CohortEncounter, CohortProcedure, DeliriumDay, OutcomeEvent,
};
pub use outcomes::{DayRange, OutcomeDef, standard_outcomes};
pub use pipeline::{CohortPipeline, CohortSnapshot, CohortSpec, MaterializeTarget};
