//! Name-dictionary derivations.
//!
//! The procedure and lab dictionaries hold the distinct partition-column
//! values of their extracts. Each registered extract file is one derivation
//! key: once any of its names are stored, the extract is no longer pending.

use async_trait::async_trait;
use compass::{ExtractKind, SourceTable, catalog};
use recordstore::typed::{insert_records, read_filtered_as};
use recordstore::{ForArrow, Predicate, Record, RecordStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, FieldRef};

use crate::driver::Derivation;
use crate::error::CohortError;

/// Dictionary row: one distinct procedure order name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureName {
    pub procedure: String,
    pub kind: ExtractKind,
}

impl ForArrow for ProcedureName {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("procedure", DataType::Utf8, false)),
            Arc::new(Field::new("kind", DataType::Utf8, false)),
        ]
    }
}

impl Record for ProcedureName {
    const TABLE: &'static str = "procedure_name";
    const KEY: &'static [&'static str] = &["procedure"];
}

/// Dictionary row: one distinct lab component name, upper-cased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabName {
    pub lab: String,
    pub kind: ExtractKind,
}

impl ForArrow for LabName {
    fn for_arrow() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("lab", DataType::Utf8, false)),
            Arc::new(Field::new("kind", DataType::Utf8, false)),
        ]
    }
}

impl Record for LabName {
    const TABLE: &'static str = "lab_name";
    const KEY: &'static [&'static str] = &["lab"];
}

async fn pending_extracts(
    store: &dyn RecordStore,
    kind: ExtractKind,
    table: &str,
) -> Result<Vec<ExtractKind>, CohortError> {
    let registered = catalog::registered(store).await?;
    if !registered.iter().any(|e| e.kind == kind) {
        return Ok(Vec::new());
    }
    let existing = store
        .read_filtered(table, &Predicate::all().and_in("kind", [kind.as_str()]))
        .await?;
    if existing.num_rows() > 0 {
        return Ok(Vec::new());
    }
    Ok(vec![kind])
}

/// Populates the procedure-name dictionary from the procedure extract.
pub struct ProcedureNameDerivation;

#[async_trait]
impl Derivation for ProcedureNameDerivation {
    type Key = ExtractKind;

    fn table(&self) -> String {
        ProcedureName::TABLE.to_string()
    }

    async fn pending_keys(
        &self,
        store: &dyn RecordStore,
    ) -> Result<Vec<ExtractKind>, CohortError> {
        pending_extracts(store, ExtractKind::Procedure, ProcedureName::TABLE).await
    }

    async fn make(&self, store: &dyn RecordStore, key: &ExtractKind) -> Result<usize, CohortError> {
        let kind = *key;
        let path = catalog::extract_path(store, kind).await?;
        let source = SourceTable::load(&path)?;
        let Some(column) = kind.partition_column() else {
            return Ok(0);
        };
        let rows: Vec<ProcedureName> = source
            .unique_strings(column)?
            .into_iter()
            .map(|procedure| ProcedureName { procedure, kind })
            .collect();
        Ok(insert_records(store, &rows).await?)
    }
}

/// Populates the lab-name dictionary from the lab extract.
pub struct LabNameDerivation;

#[async_trait]
impl Derivation for LabNameDerivation {
    type Key = ExtractKind;

    fn table(&self) -> String {
        LabName::TABLE.to_string()
    }

    async fn pending_keys(
        &self,
        store: &dyn RecordStore,
    ) -> Result<Vec<ExtractKind>, CohortError> {
        pending_extracts(store, ExtractKind::Lab, LabName::TABLE).await
    }

    async fn make(&self, store: &dyn RecordStore, key: &ExtractKind) -> Result<usize, CohortError> {
        let kind = *key;
        let path = catalog::extract_path(store, kind).await?;
        let source = SourceTable::load(&path)?;
        let Some(column) = kind.partition_column() else {
            return Ok(0);
        };
        let rows: Vec<LabName> = source
            .unique_strings(column)?
            .into_iter()
            .map(|lab| LabName {
                lab: lab.to_uppercase(),
                kind,
            })
            .collect();
        Ok(insert_records(store, &rows).await?)
    }
}

/// All known procedure names, for key-domain intersection.
pub async fn known_procedures(store: &dyn RecordStore) -> Result<Vec<String>, CohortError> {
    let rows: Vec<ProcedureName> = read_filtered_as(store, &Predicate::all()).await?;
    Ok(rows.into_iter().map(|r| r.procedure).collect())
}
