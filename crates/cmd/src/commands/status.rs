use std::path::PathBuf;

use anyhow::Result;
use recordstore::{Predicate, RecordStore};

use crate::common::open_pipeline;

pub async fn run(store_dir: &PathBuf) -> Result<()> {
    let (store, pipeline) = open_pipeline(store_dir, None).await?;
    pipeline.ensure_tables().await?;

    println!("swanlake store at {}", store_dir.display());
    for table in store.table_names().await {
        let batch = store.read_filtered(&table, &Predicate::all()).await?;
        println!("{:<24} {:>8} rows", table, batch.num_rows());
    }
    Ok(())
}
