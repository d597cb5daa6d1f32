//! End-to-end pipeline tests over synthetic extracts.

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use cohort::driver::Derivation;
use cohort::encounters::EncounterDerivation;
use cohort::{
    Alignment, Assessment, CohortPipeline, CohortSpec, CohortError, DeliriumDay,
    MaterializeTarget, OutcomeEvent,
};
use compass::ExtractKind;
use recordstore::typed::{read_filtered_as, read_filtered_as_from};
use recordstore::{MemoryStore, ParquetStore, Predicate, RecordStore};

const PROCEDURES_CSV: &str = "\
person_id,encounter_id,order_name,days_from_dob_procstart
1,10,CABG,9000
2,11,CABG,9100
3,12,VALVE,9200
4,13,PUMP,9300
9,19,CABG,x
1,10,HB CPR,8995
1,10,HB CPR,9000
1,10,HB CPR,9050
1,10,HB CPR,9099
1,10,HB CPR,9100
2,11,POST OP BLEEDING HEART ON BYPASS,9300
";

const FLOWSHEET_CSV: &str = "\
encounter_id,flowsheet_time,flowsheet_value,flowsheet_days_since_birth
10,08:00,Delirious- CAM+,9005
10,09:00,Unable to assess,9006
10,07:30,Not delirious- CAM-,8995
10,10:00,,9010
10,11:00,Delirious- CAM+,oops
11,08:15,Delirious- CAM+,9102
12,09:45,Not delirious- CAM-,9200
99,10:00,Delirious- CAM+,9999
";

fn write_extracts(dir: &tempfile::TempDir) -> (PathBuf, PathBuf) {
    let procedures = dir.path().join("Table6_Procedures.csv");
    File::create(&procedures)
        .unwrap()
        .write_all(PROCEDURES_CSV.as_bytes())
        .unwrap();
    let flowsheet = dir.path().join("Table2_Flowsheet.csv");
    File::create(&flowsheet)
        .unwrap()
        .write_all(FLOWSHEET_CSV.as_bytes())
        .unwrap();
    (procedures, flowsheet)
}

async fn pipeline_over(
    dir: &tempfile::TempDir,
    store: Arc<dyn RecordStore>,
    batch_size: usize,
) -> CohortPipeline {
    let (procedures, flowsheet) = write_extracts(dir);
    let pipeline = CohortPipeline::new(store).with_batch_size(batch_size);
    pipeline
        .register_extract(
            ExtractKind::Procedure,
            20210210,
            procedures.to_string_lossy(),
        )
        .await
        .unwrap();
    pipeline
        .register_extract(ExtractKind::Flowsheet, 20210210, flowsheet.to_string_lossy())
        .await
        .unwrap();

    pipeline
        .register_cohort(CohortSpec {
            owner: "wickers".into(),
            name: "TEG".into(),
            procedures: vec!["CABG".into(), "VALVE".into()],
            description: Some("valve surgery cohort".into()),
            subject_ids: None,
        })
        .await
        .unwrap();
    pipeline
        .register_cohort(CohortSpec {
            owner: "mack".into(),
            name: "endo".into(),
            procedures: vec!["CABG".into()],
            description: None,
            subject_ids: Some(vec![1]),
        })
        .await
        .unwrap();
    pipeline
}

fn delirium_fingerprint(mut rows: Vec<DeliriumDay>) -> Vec<(String, i64, i64, i64, Assessment)> {
    rows.sort_by(|a, b| {
        (&a.cohort_id, a.encounter_id, a.days_from_dob)
            .cmp(&(&b.cohort_id, b.encounter_id, b.days_from_dob))
    });
    rows.into_iter()
        .map(|r| {
            (
                r.cohort_id,
                r.encounter_id,
                r.days_from_dob,
                r.day,
                r.assessment,
            )
        })
        .collect()
}

#[tokio::test]
async fn full_chain_materializes_aligned_labels_and_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(&dir, store.clone(), 200).await;

    let report = pipeline.materialize(MaterializeTarget::All).await.unwrap();
    assert!(report.rows_inserted > 0);

    // Alignment: CABG encounters 10 and 11, VALVE encounter 12. The PUMP
    // encounter is no cohort's procedure and the unparsable offset dropped.
    let alignment: Vec<Alignment> = read_filtered_as(store.as_ref(), &Predicate::all())
        .await
        .unwrap();
    let mut aligned: Vec<(i64, i64, String, i64)> = alignment
        .iter()
        .map(|a| {
            (
                a.subject_id,
                a.encounter_id,
                a.procedure.clone(),
                a.offset,
            )
        })
        .collect();
    aligned.sort();
    assert_eq!(
        aligned,
        vec![
            (1, 10, "CABG".to_string(), 9000),
            (2, 11, "CABG".to_string(), 9100),
            (3, 12, "VALVE".to_string(), 9200),
        ]
    );

    // Delirium labels: day = days_from_dob - offset; empty and unparsable
    // assessments dropped; the unaligned encounter 99 absent.
    let delirium: Vec<DeliriumDay> = read_filtered_as(store.as_ref(), &Predicate::all())
        .await
        .unwrap();
    assert_eq!(
        delirium_fingerprint(delirium),
        vec![
            ("mack/endo".to_string(), 10, 8995, -5, Assessment::N),
            ("mack/endo".to_string(), 10, 9005, 5, Assessment::Y),
            ("mack/endo".to_string(), 10, 9006, 6, Assessment::U),
            ("wickers/TEG".to_string(), 10, 8995, -5, Assessment::N),
            ("wickers/TEG".to_string(), 10, 9005, 5, Assessment::Y),
            ("wickers/TEG".to_string(), 10, 9006, 6, Assessment::U),
            ("wickers/TEG".to_string(), 11, 9102, 2, Assessment::Y),
            ("wickers/TEG".to_string(), 12, 9200, 0, Assessment::N),
        ]
    );

    // Outcome windowing: event days [-5, 0, 50, 99, 100] relative to the
    // CABG anchor keep exactly [0, 50, 99], for both cohorts owning
    // encounter 10.
    let arrests: Vec<OutcomeEvent> =
        read_filtered_as_from(store.as_ref(), "outcome_cardiac_arrest", &Predicate::all())
            .await
            .unwrap();
    let mut arrest_days: Vec<(String, i64)> = arrests
        .iter()
        .map(|o| (o.cohort_id.clone(), o.day))
        .collect();
    arrest_days.sort();
    assert_eq!(
        arrest_days,
        vec![
            ("mack/endo".to_string(), 0),
            ("mack/endo".to_string(), 50),
            ("mack/endo".to_string(), 99),
            ("wickers/TEG".to_string(), 0),
            ("wickers/TEG".to_string(), 50),
            ("wickers/TEG".to_string(), 99),
        ]
    );

    // The bleed window has no upper bound.
    let bleeds: Vec<OutcomeEvent> =
        read_filtered_as_from(store.as_ref(), "outcome_bleed", &Predicate::all())
            .await
            .unwrap();
    assert_eq!(bleeds.len(), 1);
    assert_eq!(bleeds[0].day, 200);
    assert_eq!(bleeds[0].cohort_id, "wickers/TEG");

    let ecmo: Vec<OutcomeEvent> =
        read_filtered_as_from(store.as_ref(), "outcome_vv_ecmo", &Predicate::all())
            .await
            .unwrap();
    assert!(ecmo.is_empty());
}

#[tokio::test]
async fn materialize_twice_inserts_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(&dir, store.clone(), 200).await;

    pipeline.materialize(MaterializeTarget::All).await.unwrap();
    let first: Vec<DeliriumDay> = read_filtered_as(store.as_ref(), &Predicate::all())
        .await
        .unwrap();

    let report = pipeline.materialize(MaterializeTarget::All).await.unwrap();
    assert_eq!(report.rows_inserted, 0);

    let second: Vec<DeliriumDay> = read_filtered_as(store.as_ref(), &Predicate::all())
        .await
        .unwrap();
    assert_eq!(delirium_fingerprint(first), delirium_fingerprint(second));
}

#[tokio::test]
async fn no_two_rows_share_a_primary_key() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(&dir, store.clone(), 200).await;

    pipeline.materialize(MaterializeTarget::All).await.unwrap();
    pipeline.materialize(MaterializeTarget::All).await.unwrap();

    let delirium: Vec<DeliriumDay> = read_filtered_as(store.as_ref(), &Predicate::all())
        .await
        .unwrap();
    let keys: HashSet<(String, String, i64, i64)> = delirium
        .iter()
        .map(|r| {
            (
                r.cohort_id.clone(),
                r.procedure.clone(),
                r.encounter_id,
                r.days_from_dob,
            )
        })
        .collect();
    assert_eq!(keys.len(), delirium.len());

    let alignment: Vec<Alignment> = read_filtered_as(store.as_ref(), &Predicate::all())
        .await
        .unwrap();
    let keys: HashSet<(i64, i64, String)> = alignment
        .iter()
        .map(|a| (a.subject_id, a.encounter_id, a.procedure.clone()))
        .collect();
    assert_eq!(keys.len(), alignment.len());
}

#[tokio::test]
async fn derived_rows_are_identical_for_any_batch_size() {
    let mut fingerprints = Vec::new();
    for batch_size in [1usize, 50, 200, 10000] {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let pipeline = pipeline_over(&dir, store.clone(), batch_size).await;
        pipeline.materialize(MaterializeTarget::All).await.unwrap();

        let delirium: Vec<DeliriumDay> = read_filtered_as(store.as_ref(), &Predicate::all())
            .await
            .unwrap();
        let arrests: Vec<OutcomeEvent> =
            read_filtered_as_from(store.as_ref(), "outcome_cardiac_arrest", &Predicate::all())
                .await
                .unwrap();
        let mut arrest_days: Vec<(String, i64)> = arrests
            .into_iter()
            .map(|o| (o.cohort_id, o.days_from_dob))
            .collect();
        arrest_days.sort();
        fingerprints.push((delirium_fingerprint(delirium), arrest_days));
    }
    assert!(fingerprints.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn pending_keys_shrink_after_a_successful_run() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(&dir, store.clone(), 200).await;

    // Alignment and encounters have to exist before encounter keys resolve.
    pipeline
        .materialize(MaterializeTarget::Names)
        .await
        .unwrap();
    pipeline
        .materialize(MaterializeTarget::Alignment)
        .await
        .unwrap();

    let derivation = EncounterDerivation { batch_size: 200 };
    let before: HashSet<String> = derivation
        .pending_keys(store.as_ref())
        .await
        .unwrap()
        .into_iter()
        .map(|k| k.to_string())
        .collect();
    assert_eq!(before.len(), 3);

    pipeline
        .materialize(MaterializeTarget::Encounters)
        .await
        .unwrap();

    let after: HashSet<String> = derivation
        .pending_keys(store.as_ref())
        .await
        .unwrap()
        .into_iter()
        .map(|k| k.to_string())
        .collect();
    assert!(after.is_subset(&before));
    assert!(after.len() < before.len());
}

#[tokio::test]
async fn cohort_registration_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(&dir, store.clone(), 200).await;

    let again = pipeline
        .register_cohort(CohortSpec {
            owner: "wickers".into(),
            name: "TEG".into(),
            procedures: vec!["SOMETHING ELSE".into()],
            description: None,
            subject_ids: None,
        })
        .await
        .unwrap();
    assert_eq!(again, "wickers/TEG");

    let cohorts = pipeline.list_cohorts().await.unwrap();
    assert_eq!(cohorts.len(), 2);
    let teg = cohorts
        .iter()
        .find(|c| c.cohort_id == "wickers/TEG")
        .unwrap();
    // The original registration wins.
    assert_eq!(teg.procedures, vec!["CABG".to_string(), "VALVE".to_string()]);
}

#[tokio::test]
async fn snapshot_respects_subject_allowlist() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(&dir, store.clone(), 200).await;
    pipeline.materialize(MaterializeTarget::All).await.unwrap();

    let snapshot = pipeline.snapshot("mack/endo").await.unwrap();
    assert_eq!(snapshot.cohort.cohort_id, "mack/endo");
    assert_eq!(snapshot.procedures.len(), 1);
    assert_eq!(snapshot.encounters.len(), 1);
    assert_eq!(snapshot.encounters[0].encounter_id, 10);
    assert!(snapshot.alignment.iter().all(|a| a.subject_id == 1));

    let missing = pipeline.snapshot("nobody/nothing").await;
    assert!(matches!(
        missing,
        Err(CohortError::CohortNotFound { .. })
    ));
}

#[tokio::test]
async fn failed_key_stays_pending_and_retries_whole() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let pipeline = pipeline_over(&dir, store.clone(), 200).await;

    pipeline
        .materialize(MaterializeTarget::Names)
        .await
        .unwrap();
    pipeline
        .materialize(MaterializeTarget::Alignment)
        .await
        .unwrap();
    pipeline
        .materialize(MaterializeTarget::Encounters)
        .await
        .unwrap();

    // Unreachable flowsheet source: the call fails fatally, nothing lands.
    let flowsheet = dir.path().join("Table2_Flowsheet.csv");
    let hidden = dir.path().join("Table2_Flowsheet.csv.bak");
    std::fs::rename(&flowsheet, &hidden).unwrap();
    assert!(
        pipeline
            .materialize(MaterializeTarget::Delirium)
            .await
            .is_err()
    );
    let delirium: Vec<DeliriumDay> = read_filtered_as(store.as_ref(), &Predicate::all())
        .await
        .unwrap();
    assert!(delirium.is_empty());

    // Source restored: the same keys are still pending and complete now.
    std::fs::rename(&hidden, &flowsheet).unwrap();
    let report = pipeline
        .materialize(MaterializeTarget::Delirium)
        .await
        .unwrap();
    assert_eq!(report.rows_inserted, 8);
}

#[tokio::test]
async fn parquet_store_resumes_incrementally_across_reopens() {
    let extract_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(ParquetStore::open(store_dir.path()).await.unwrap());
        let pipeline = pipeline_over(&extract_dir, store.clone(), 200).await;
        pipeline.materialize(MaterializeTarget::All).await.unwrap();
        store.flush().await.unwrap();
    }

    let store = Arc::new(ParquetStore::open(store_dir.path()).await.unwrap());
    let pipeline = CohortPipeline::new(store.clone()).with_batch_size(200);
    let report = pipeline.materialize(MaterializeTarget::All).await.unwrap();
    assert_eq!(report.rows_inserted, 0);

    let delirium: Vec<DeliriumDay> =
        read_filtered_as(store.as_ref() as &dyn RecordStore, &Predicate::all())
            .await
            .unwrap();
    assert_eq!(delirium.len(), 8);
}
