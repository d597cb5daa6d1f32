use std::path::PathBuf;

use anyhow::{Result, anyhow};
use cohort::MaterializeTarget;

use crate::common::open_pipeline;

pub async fn run(store_dir: &PathBuf, target: &str, batch_size: Option<usize>) -> Result<()> {
    let target: MaterializeTarget = target.parse().map_err(|e: String| anyhow!(e))?;
    let (store, pipeline) = open_pipeline(store_dir, batch_size).await?;
    let report = pipeline.materialize(target).await?;
    store.flush().await?;
    println!(
        "Materialized {} keys, inserted {} rows",
        report.keys_processed, report.rows_inserted
    );
    Ok(())
}
