use listings_migrator_repository::{InspectorError, SourceError};
use listings_migrator_shared::SchemaError;
use thiserror::Error;

/// Reasons a run must not start.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Missing source tables: {}", .0.join(", "))]
    MissingSourceTables(Vec<String>),

    #[error("Missing target tables: {}", .0.join(", "))]
    MissingTargetTables(Vec<String>),

    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaError),

    #[error("Source error: {0}")]
    SourceError(#[from] SourceError),

    #[error("Target inspection error: {0}")]
    InspectorError(#[from] InspectorError),
}
