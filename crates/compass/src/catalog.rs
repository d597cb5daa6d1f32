//! Extract-file catalog.
//!
//! Which raw extract backs each [`ExtractKind`] is itself recorded in the
//! store, so derivations can resolve their upstream source without any
//! global configuration. Registration is skip-on-conflict like every other
//! insert: re-registering a kind is a no-op.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, FieldRef};
use diagnostics::*;
use recordstore::typed::{ensure_table_for, insert_records, read_filtered_as};
use recordstore::{ForArrow, Predicate, Record, RecordStore};
use serde::{Deserialize, Serialize};

use crate::error::CompassError;
use crate::kind::ExtractKind;

/// One registered raw extract file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractFile {
    pub kind: ExtractKind,
    pub version: i64,
    pub path: String,
}

impl ForArrow for ExtractFile {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("kind", DataType::Utf8, false)),
            Arc::new(Field::new("version", DataType::Int64, false)),
            Arc::new(Field::new("path", DataType::Utf8, false)),
        ]
    }
}

impl Record for ExtractFile {
    const TABLE: &'static str = "extract_file";
    const KEY: &'static [&'static str] = &["kind"];
}

/// Register an extract file. Returns true if the row was new.
pub async fn register(store: &dyn RecordStore, file: &ExtractFile) -> Result<bool, CompassError> {
    ensure_table_for::<ExtractFile>(store).await?;
    let inserted = insert_records(store, std::slice::from_ref(file)).await?;
    let kind = file.kind.as_str();
    let path = file.path.as_str();
    if inserted > 0 {
        info!("registered {kind} extract at {path}");
    } else {
        debug!("{kind} extract already registered, keeping existing entry");
    }
    Ok(inserted > 0)
}

/// Resolve the extract file backing a kind. Missing registration is a
/// configuration error, surfaced immediately.
pub async fn lookup(store: &dyn RecordStore, kind: ExtractKind) -> Result<ExtractFile, CompassError> {
    ensure_table_for::<ExtractFile>(store).await?;
    let rows: Vec<ExtractFile> =
        read_filtered_as(store, &Predicate::all().and_in("kind", [kind.as_str()])).await?;
    rows.into_iter()
        .next()
        .ok_or(CompassError::MissingExtract { kind })
}

/// Resolve the extract path backing a kind.
pub async fn extract_path(
    store: &dyn RecordStore,
    kind: ExtractKind,
) -> Result<PathBuf, CompassError> {
    Ok(PathBuf::from(lookup(store, kind).await?.path))
}

/// All registered extracts.
pub async fn registered(store: &dyn RecordStore) -> Result<Vec<ExtractFile>, CompassError> {
    ensure_table_for::<ExtractFile>(store).await?;
    Ok(read_filtered_as(store, &Predicate::all()).await?)
}

/// YAML catalog file used by the CLI to bootstrap a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub extracts: Vec<ExtractFile>,
}

/// Load and validate a catalog config file.
pub fn load_catalog_config(path: impl AsRef<Path>) -> Result<CatalogConfig, CompassError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| CompassError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let config: CatalogConfig =
        serde_yaml_ng::from_str(&content).map_err(|e| CompassError::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
    validate_catalog_config(&config)?;
    Ok(config)
}

pub(crate) fn validate_catalog_config(config: &CatalogConfig) -> Result<(), CompassError> {
    if config.extracts.is_empty() {
        return Err(CompassError::Config {
            message: "at least one extract must be configured".to_string(),
        });
    }
    for extract in &config.extracts {
        if extract.path.is_empty() {
            let kind = extract.kind;
            return Err(CompassError::Config {
                message: format!("extract {kind} has an empty path"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordstore::MemoryStore;

    #[tokio::test]
    async fn register_is_idempotent_per_kind() {
        let store = MemoryStore::new();
        let first = ExtractFile {
            kind: ExtractKind::Procedure,
            version: 20210210,
            path: "/data/Table6_Procedures.csv".into(),
        };
        assert!(register(&store, &first).await.unwrap());

        let replacement = ExtractFile {
            version: 20990101,
            path: "/data/other.csv".into(),
            ..first.clone()
        };
        assert!(!register(&store, &replacement).await.unwrap());

        let resolved = lookup(&store, ExtractKind::Procedure).await.unwrap();
        assert_eq!(resolved, first);
    }

    #[tokio::test]
    async fn missing_extract_is_a_configuration_error() {
        let store = MemoryStore::new();
        let err = lookup(&store, ExtractKind::Flowsheet).await.unwrap_err();
        assert!(matches!(
            err,
            CompassError::MissingExtract {
                kind: ExtractKind::Flowsheet
            }
        ));
    }

    #[test]
    fn catalog_config_parses_and_validates() {
        let yaml = r#"
extracts:
  - kind: procedure
    version: 20210210
    path: /data/Table6_Procedures.csv
  - kind: flowsheet
    version: 20210210
    path: /data/Table2_Flowsheet.csv
"#;
        let config: CatalogConfig = serde_yaml_ng::from_str(yaml).unwrap();
        validate_catalog_config(&config).unwrap();
        assert_eq!(config.extracts.len(), 2);
        assert_eq!(config.extracts[0].kind, ExtractKind::Procedure);

        let empty = CatalogConfig { extracts: vec![] };
        assert!(validate_catalog_config(&empty).is_err());
    }
}
