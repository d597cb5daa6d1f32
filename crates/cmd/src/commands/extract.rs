use std::path::PathBuf;

use anyhow::Result;
use compass::{ExtractKind, catalog};

use crate::common::open_pipeline;

pub async fn register(
    store_dir: &PathBuf,
    kind: &str,
    path: &str,
    version: i64,
) -> Result<()> {
    let kind: ExtractKind = kind.parse()?;
    let (store, pipeline) = open_pipeline(store_dir, None).await?;
    let inserted = pipeline.register_extract(kind, version, path).await?;
    store.flush().await?;
    if inserted {
        println!("Registered {kind} extract: {path}");
    } else {
        println!("A {kind} extract is already registered; kept the existing entry");
    }
    Ok(())
}

pub async fn import(store_dir: &PathBuf, config_path: &PathBuf) -> Result<()> {
    let config = compass::load_catalog_config(config_path)?;
    let (store, pipeline) = open_pipeline(store_dir, None).await?;
    let mut registered = 0;
    for extract in &config.extracts {
        if pipeline
            .register_extract(extract.kind, extract.version, extract.path.clone())
            .await?
        {
            registered += 1;
        }
    }
    store.flush().await?;
    println!(
        "Imported {} of {} extracts from {}",
        registered,
        config.extracts.len(),
        config_path.display()
    );
    Ok(())
}

pub async fn list(store_dir: &PathBuf) -> Result<()> {
    let (store, pipeline) = open_pipeline(store_dir, None).await?;
    pipeline.ensure_tables().await?;
    let extracts = catalog::registered(store.as_ref()).await?;
    if extracts.is_empty() {
        println!("No extracts registered");
        return Ok(());
    }
    for extract in extracts {
        println!(
            "{:<12} v{:<10} {}",
            extract.kind.as_str(),
            extract.version,
            extract.path
        );
    }
    Ok(())
}
