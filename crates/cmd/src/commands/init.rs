use std::path::PathBuf;

use anyhow::{Result, bail};

use crate::common::open_pipeline;

pub async fn run(store_dir: &PathBuf) -> Result<()> {
    if store_dir.join("cohort.parquet").exists() {
        bail!("store already initialized at {}", store_dir.display());
    }

    let (store, pipeline) = open_pipeline(store_dir, None).await?;
    pipeline.ensure_tables().await?;
    store.flush().await?;

    println!("Initialized swanlake store at {}", store_dir.display());
    Ok(())
}
