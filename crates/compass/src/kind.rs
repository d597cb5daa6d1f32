//! The fixed set of COMPASS extract kinds.
//!
//! Each kind knows the column its rows are partitioned by, which is also
//! the column the name dictionaries are derived from.

use serde::{Deserialize, Serialize};

use crate::error::CompassError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractKind {
    Encounter,
    Procedure,
    Flowsheet,
    Lab,
    Diagnosis,
}

impl ExtractKind {
    pub const ALL: [ExtractKind; 5] = [
        ExtractKind::Encounter,
        ExtractKind::Procedure,
        ExtractKind::Flowsheet,
        ExtractKind::Lab,
        ExtractKind::Diagnosis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractKind::Encounter => "encounter",
            ExtractKind::Procedure => "procedure",
            ExtractKind::Flowsheet => "flowsheet",
            ExtractKind::Lab => "lab",
            ExtractKind::Diagnosis => "diagnosis",
        }
    }

    /// Column the extract is partitioned by, if any.
    pub fn partition_column(&self) -> Option<&'static str> {
        match self {
            ExtractKind::Encounter => None,
            ExtractKind::Procedure => Some("order_name"),
            ExtractKind::Flowsheet => Some("display_name"),
            ExtractKind::Lab => Some("lab_component_name"),
            ExtractKind::Diagnosis => Some("provenance"),
        }
    }
}

impl std::fmt::Display for ExtractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExtractKind {
    type Err = CompassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "encounter" => Ok(ExtractKind::Encounter),
            "procedure" => Ok(ExtractKind::Procedure),
            "flowsheet" => Ok(ExtractKind::Flowsheet),
            "lab" => Ok(ExtractKind::Lab),
            "diagnosis" => Ok(ExtractKind::Diagnosis),
            other => Err(CompassError::UnknownKind {
                name: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_strings() {
        for kind in ExtractKind::ALL {
            assert_eq!(kind.as_str().parse::<ExtractKind>().unwrap(), kind);
        }
        assert!("flowchart".parse::<ExtractKind>().is_err());
    }

    #[test]
    fn partition_columns() {
        assert_eq!(
            ExtractKind::Procedure.partition_column(),
            Some("order_name")
        );
        assert_eq!(ExtractKind::Encounter.partition_column(), None);
    }
}
