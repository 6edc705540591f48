use listings_migrator_repository::{InspectorError, SourceError};
use listings_migrator_shared::SchemaError;
use thiserror::Error;

/// A validation query that could not run.
///
/// Never aborts validation: the affected check is reported as a failed finding.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaError),

    #[error("Source error: {0}")]
    SourceError(#[from] SourceError),

    #[error("Target inspection error: {0}")]
    InspectorError(#[from] InspectorError),
}
