use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use cohort::CohortPipeline;
use recordstore::ParquetStore;

/// Resolve the store directory from `--store` or the SWANLAKE environment
/// variable.
pub fn resolve_store_dir(flag: &Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.clone());
    }
    match env::var("SWANLAKE") {
        Ok(val) => Ok(PathBuf::from(val)),
        Err(_) => Err(anyhow!(
            "no store directory: pass --store or set the SWANLAKE environment variable"
        )),
    }
}

/// Open the store and build a pipeline over it.
pub async fn open_pipeline(
    store_dir: &PathBuf,
    batch_size: Option<usize>,
) -> Result<(Arc<ParquetStore>, CohortPipeline)> {
    let store = Arc::new(
        ParquetStore::open(store_dir)
            .await
            .map_err(|e| anyhow!("failed to open store at {}: {}", store_dir.display(), e))?,
    );
    let mut pipeline = CohortPipeline::new(store.clone());
    if let Some(batch_size) = batch_size {
        pipeline = pipeline.with_batch_size(batch_size);
    }
    Ok((store, pipeline))
}
