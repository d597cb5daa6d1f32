//! Outcome windowing.
//!
//! Each outcome definition names a set of event procedures and a day window
//! relative to the index procedure. A definition is an independent
//! derivation over its own table, keyed by cohort encounter: qualifying
//! events are the definition's procedure events for that encounter whose
//! aligned day falls inside the window.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use compass::{ExtractKind, SourceTable, catalog};
use recordstore::typed::{insert_records_into, read_filtered_as, read_filtered_as_from};
use recordstore::{Predicate, RecordStore};
use tokio::sync::Mutex;

use crate::cache::RunCache;
use crate::driver::{Derivation, EncounterKey, missing_keys};
use crate::error::CohortError;
use crate::model::{Alignment, CohortEncounter, OutcomeEvent};
use crate::transform::{required_column, value_i64};

/// Day window relative to the index procedure: `lower <= day` and, when an
/// upper bound is present, `day < upper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub lower: i64,
    pub upper: Option<i64>,
}

impl DayRange {
    pub const fn bounded(lower: i64, upper: i64) -> Self {
        Self {
            lower,
            upper: Some(upper),
        }
    }

    pub const fn at_least(lower: i64) -> Self {
        Self { lower, upper: None }
    }

    pub fn contains(&self, day: i64) -> bool {
        day >= self.lower && self.upper.is_none_or(|upper| day < upper)
    }
}

impl std::fmt::Display for DayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.upper {
            Some(upper) => write!(f, "{} <= day < {}", self.lower, upper),
            None => write!(f, "{} <= day", self.lower),
        }
    }
}

/// One outcome definition: which procedure events count, and when.
#[derive(Debug, Clone)]
pub struct OutcomeDef {
    pub name: &'static str,
    pub event_procedures: &'static [&'static str],
    pub window: DayRange,
}

impl OutcomeDef {
    pub fn table(&self) -> String {
        format!("outcome_{}", self.name)
    }
}

/// The shipped outcome definitions.
pub fn standard_outcomes() -> Vec<OutcomeDef> {
    vec![
        OutcomeDef {
            name: "vv_ecmo",
            event_procedures: &[
                "HB ECMO/ECLS INITIAL VENO-VENOUS",
                "HB ECMO/ECLS EACH DAY VENO-VENOUS",
            ],
            window: DayRange::bounded(0, 100),
        },
        OutcomeDef {
            name: "cardiac_arrest",
            event_procedures: &[
                "ED CPR PROCEDURE",
                "PR HEART/LUNG RESUSCITATION (CPR)",
                "HB CPR",
            ],
            window: DayRange::bounded(0, 100),
        },
        OutcomeDef {
            name: "mechanical_support",
            event_procedures: &[
                "HB OR-CATH INTRA-AORTIC BALLOON PUMP (06)",
                "HB ECMO/ECLS INITIAL VENO-ARTERIAL",
                "HB ECMO/ECLS EACH DAY VENO-ARTERIAL",
                "IMPELLA DEVICE INSERTION / REPAIR",
            ],
            window: DayRange::bounded(0, 100),
        },
        OutcomeDef {
            name: "bleed",
            event_procedures: &[
                "Control Bleeding in Mediastinum, Open Approach",
                "Control Bleeding in Chest Wall, Open Approach",
                "POST OPERATIVE BLEEDING HEART  NO BYPASS",
                "POST OP BLEEDING HEART ON BYPASS",
            ],
            window: DayRange::at_least(0),
        },
    ]
}

/// Event days per encounter, built once per run from the procedure extract.
struct EventIndex {
    days_by_encounter: HashMap<i64, Vec<i64>>,
}

/// Populates one outcome table. Create a fresh instance per materialization
/// run; the event index cache is scoped to this instance.
pub struct OutcomeDerivation {
    def: OutcomeDef,
    cache: Mutex<RunCache<Arc<EventIndex>>>,
}

impl OutcomeDerivation {
    pub fn new(def: OutcomeDef) -> Self {
        Self {
            def,
            cache: Mutex::new(RunCache::new()),
        }
    }

    /// The definition's event rows, restricted to known cohort encounters.
    async fn event_index(&self, store: &dyn RecordStore) -> Result<Arc<EventIndex>, CohortError> {
        let mut cache = self.cache.lock().await;
        if let Some(index) = cache.get() {
            return Ok(index.clone());
        }

        let encounters: Vec<CohortEncounter> =
            read_filtered_as(store, &Predicate::all()).await?;
        let encounter_ids: HashSet<i64> =
            encounters.into_iter().map(|e| e.encounter_id).collect();

        let path = catalog::extract_path(store, ExtractKind::Procedure).await?;
        let events = SourceTable::load(&path)?.filter(
            &Predicate::all()
                .and_in("order_name", self.def.event_procedures.iter().copied())
                .and_in("encounter_id", encounter_ids.iter().copied()),
        )?;

        let mut days_by_encounter: HashMap<i64, Vec<i64>> = HashMap::new();
        let batch = events.concat()?;
        if batch.num_rows() > 0 {
            let encounters = required_column(&batch, "encounter_id")?;
            let days = required_column(&batch, "days_from_dob_procstart")?;
            for i in 0..batch.num_rows() {
                let (Some(encounter_id), Some(day)) =
                    (value_i64(encounters, i), value_i64(days, i))
                else {
                    continue;
                };
                days_by_encounter.entry(encounter_id).or_default().push(day);
            }
        }

        Ok(cache.set(Arc::new(EventIndex { days_by_encounter })).clone())
    }
}

#[async_trait]
impl Derivation for OutcomeDerivation {
    type Key = EncounterKey;

    fn table(&self) -> String {
        self.def.table()
    }

    async fn pending_keys(
        &self,
        store: &dyn RecordStore,
    ) -> Result<Vec<EncounterKey>, CohortError> {
        let domain: Vec<EncounterKey> =
            read_filtered_as::<CohortEncounter>(store, &Predicate::all())
                .await?
                .into_iter()
                .map(|e| EncounterKey {
                    cohort_id: e.cohort_id,
                    encounter_id: e.encounter_id,
                    procedure: e.procedure,
                })
                .collect();
        let existing: HashSet<EncounterKey> =
            read_filtered_as_from::<OutcomeEvent>(store, &self.def.table(), &Predicate::all())
                .await?
                .into_iter()
                .map(|o| EncounterKey {
                    cohort_id: o.cohort_id,
                    encounter_id: o.encounter_id,
                    procedure: o.procedure,
                })
                .collect();
        Ok(missing_keys(domain, &existing))
    }

    async fn make(&self, store: &dyn RecordStore, key: &EncounterKey) -> Result<usize, CohortError> {
        let index = self.event_index(store).await?;
        let Some(event_days) = index.days_by_encounter.get(&key.encounter_id) else {
            return Ok(0);
        };

        // Anchor on the cohort's index procedure for this encounter.
        let aligned: Vec<Alignment> = read_filtered_as(
            store,
            &Predicate::all()
                .and_in("encounter_id", [key.encounter_id])
                .and_in("procedure", [key.procedure.as_str()]),
        )
        .await?;
        let Some(offset) = aligned.first().map(|a| a.offset) else {
            return Ok(0);
        };

        let rows: Vec<OutcomeEvent> = event_days
            .iter()
            .filter_map(|&days_from_dob| {
                let day = days_from_dob - offset;
                self.def.window.contains(day).then(|| OutcomeEvent {
                    cohort_id: key.cohort_id.clone(),
                    encounter_id: key.encounter_id,
                    procedure: key.procedure.clone(),
                    days_from_dob,
                    day,
                })
            })
            .collect();
        Ok(insert_records_into(store, &self.def.table(), &rows).await?)
    }
}
