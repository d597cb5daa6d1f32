// Error types for cohort derivation
#[derive(Debug, thiserror::Error)]
pub enum CohortError {
    #[error("cohort not found: {cohort_id}")]
    CohortNotFound { cohort_id: String },

    #[error("invalid cohort spec: {message}")]
    InvalidCohort { message: String },

    #[error("required field missing from source batch: {column}")]
    MissingField { column: String },

    #[error("Store error: {0}")]
    Store(#[from] recordstore::StoreError),

    #[error("Extract error: {0}")]
    Compass(#[from] compass::CompassError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
}
