use std::path::PathBuf;

use anyhow::{Result, anyhow};
use cohort::CohortSpec;
use recordstore::typed::to_batch;

use crate::common::open_pipeline;

#[allow(clippy::too_many_arguments)]
pub async fn register(
    store_dir: &PathBuf,
    owner: Option<String>,
    name: &str,
    procedures: Vec<String>,
    description: Option<String>,
    subjects: Vec<i64>,
    subjects_file: Option<PathBuf>,
) -> Result<()> {
    let owner = owner
        .or_else(|| std::env::var("USER").ok())
        .ok_or_else(|| anyhow!("no owner: pass --owner or set USER"))?;

    let subject_ids = match subjects_file {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow!("failed to read {}: {}", path.display(), e))?;
            Some(serde_json::from_str::<Vec<i64>>(&content)?)
        }
        None if !subjects.is_empty() => Some(subjects),
        None => None,
    };

    let (store, pipeline) = open_pipeline(store_dir, None).await?;
    let cohort_id = pipeline
        .register_cohort(CohortSpec {
            owner,
            name: name.to_string(),
            procedures,
            description,
            subject_ids,
        })
        .await?;
    store.flush().await?;
    println!("Registered cohort {cohort_id}");
    Ok(())
}

pub async fn list(store_dir: &PathBuf) -> Result<()> {
    let (_store, pipeline) = open_pipeline(store_dir, None).await?;
    let cohorts = pipeline.list_cohorts().await?;
    if cohorts.is_empty() {
        println!("No cohorts registered");
        return Ok(());
    }
    println!("cohort_id");
    for cohort in cohorts {
        let description = cohort.description.unwrap_or_default();
        println!("- {:<24} {}", cohort.cohort_id, description);
    }
    Ok(())
}

pub async fn show(store_dir: &PathBuf, cohort_id: &str) -> Result<()> {
    let (_store, pipeline) = open_pipeline(store_dir, None).await?;
    let snapshot = pipeline.snapshot(cohort_id).await?;

    println!("cohort:      {}", snapshot.cohort.cohort_id);
    println!("owner:       {}", snapshot.cohort.owner);
    if let Some(description) = &snapshot.cohort.description {
        println!("description: {description}");
    }
    if let Some(subject_ids) = &snapshot.cohort.subject_ids {
        println!("subjects:    {} allowlisted", subject_ids.len());
    }
    println!("procedures:");
    for procedure in &snapshot.procedures {
        println!("- {}", procedure.procedure);
    }
    println!(
        "encounters:  {} aligned, {} materialized",
        snapshot.alignment.len(),
        snapshot.encounters.len()
    );

    if !snapshot.alignment.is_empty() {
        let batch = to_batch(&snapshot.alignment)?;
        println!("{}", arrow::util::pretty::pretty_format_batches(&[batch])?);
    }
    Ok(())
}
