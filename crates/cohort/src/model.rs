//! Typed table definitions for the cohort schema.
//!
//! One struct per stored table; primary keys and Arrow field lists live next
//! to the data they describe so the whole schema is checked at compile time.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, FieldRef, TimeUnit};
use recordstore::{ForArrow, Record};
use serde::{Deserialize, Serialize};

/// A registered cohort: a named set of index procedures, optionally
/// restricted to an explicit subject allowlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    /// `owner/name`, assigned at registration.
    pub cohort_id: String,
    pub owner: String,
    pub name: String,
    /// Explicit subject allowlist; None admits every subject.
    pub subject_ids: Option<Vec<i64>>,
    /// Index procedures the cohort is defined over.
    pub procedures: Vec<String>,
    pub description: Option<String>,
    /// Microseconds since the Unix epoch, UTC.
    pub created_at: i64,
}

impl ForArrow for Cohort {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("cohort_id", DataType::Utf8, false)),
            Arc::new(Field::new("owner", DataType::Utf8, false)),
            Arc::new(Field::new("name", DataType::Utf8, false)),
            Arc::new(Field::new(
                "subject_ids",
                DataType::List(Arc::new(Field::new("item", DataType::Int64, false))),
                true,
            )),
            Arc::new(Field::new(
                "procedures",
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, false))),
                false,
            )),
            Arc::new(Field::new("description", DataType::Utf8, true)),
            Arc::new(Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            )),
        ]
    }
}

impl Record for Cohort {
    const TABLE: &'static str = "cohort";
    const KEY: &'static [&'static str] = &["cohort_id"];
}

/// Child row: one per procedure a cohort is defined over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortProcedure {
    pub cohort_id: String,
    pub procedure: String,
}

impl ForArrow for CohortProcedure {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("cohort_id", DataType::Utf8, false)),
            Arc::new(Field::new("procedure", DataType::Utf8, false)),
        ]
    }
}

impl Record for CohortProcedure {
    const TABLE: &'static str = "cohort_procedure";
    const KEY: &'static [&'static str] = &["cohort_id", "procedure"];
}

/// Child row: a concrete encounter matching the cohort's procedure filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortEncounter {
    pub cohort_id: String,
    pub encounter_id: i64,
    pub procedure: String,
    pub subject_id: i64,
}

impl ForArrow for CohortEncounter {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("cohort_id", DataType::Utf8, false)),
            Arc::new(Field::new("encounter_id", DataType::Int64, false)),
            Arc::new(Field::new("procedure", DataType::Utf8, false)),
            Arc::new(Field::new("subject_id", DataType::Int64, false)),
        ]
    }
}

impl Record for CohortEncounter {
    const TABLE: &'static str = "cohort_encounter";
    const KEY: &'static [&'static str] = &["cohort_id", "encounter_id", "procedure"];
}

/// Per-(subject, encounter, procedure) anchor: the day offset of the index
/// procedure, to which all other time series are aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub subject_id: i64,
    pub encounter_id: i64,
    pub procedure: String,
    /// Days from birth of the procedure event; never negative.
    pub offset: i64,
}

impl ForArrow for Alignment {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("subject_id", DataType::Int64, false)),
            Arc::new(Field::new("encounter_id", DataType::Int64, false)),
            Arc::new(Field::new("procedure", DataType::Utf8, false)),
            Arc::new(Field::new("offset", DataType::Int64, false)),
        ]
    }
}

impl Record for Alignment {
    const TABLE: &'static str = "alignment";
    const KEY: &'static [&'static str] = &["subject_id", "encounter_id", "procedure"];
}

/// CAM delirium assessment outcome codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Assessment {
    /// Delirious (CAM positive)
    Y,
    /// Not delirious (CAM negative)
    N,
    /// Unable to assess
    U,
}

impl Assessment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Assessment::Y => "Y",
            Assessment::N => "N",
            Assessment::U => "U",
        }
    }
}

/// One delirium assessment, day-aligned to the cohort's index procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliriumDay {
    pub cohort_id: String,
    pub procedure: String,
    pub encounter_id: i64,
    pub days_from_dob: i64,
    /// Days since the index procedure; negative for assessments before it.
    pub day: i64,
    /// Clock time of the assessment.
    pub time: String,
    pub assessment: Assessment,
}

impl ForArrow for DeliriumDay {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("cohort_id", DataType::Utf8, false)),
            Arc::new(Field::new("procedure", DataType::Utf8, false)),
            Arc::new(Field::new("encounter_id", DataType::Int64, false)),
            Arc::new(Field::new("days_from_dob", DataType::Int64, false)),
            Arc::new(Field::new("day", DataType::Int64, false)),
            Arc::new(Field::new("time", DataType::Utf8, false)),
            Arc::new(Field::new("assessment", DataType::Utf8, false)),
        ]
    }
}

impl Record for DeliriumDay {
    const TABLE: &'static str = "delirium_day";
    const KEY: &'static [&'static str] = &["cohort_id", "procedure", "encounter_id", "days_from_dob"];
}

/// One qualifying outcome event inside an outcome definition's day window.
///
/// Stored in a table per outcome definition (`outcome_<name>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub cohort_id: String,
    pub encounter_id: i64,
    /// The cohort's index procedure for this encounter.
    pub procedure: String,
    pub days_from_dob: i64,
    pub day: i64,
}

impl ForArrow for OutcomeEvent {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("cohort_id", DataType::Utf8, false)),
            Arc::new(Field::new("encounter_id", DataType::Int64, false)),
            Arc::new(Field::new("procedure", DataType::Utf8, false)),
            Arc::new(Field::new("days_from_dob", DataType::Int64, false)),
            Arc::new(Field::new("day", DataType::Int64, false)),
        ]
    }
}

impl Record for OutcomeEvent {
    const TABLE: &'static str = "outcome_event";
    const KEY: &'static [&'static str] = &["cohort_id", "encounter_id", "procedure", "days_from_dob"];
}
