use listings_migrator_repository::{InspectorError, LoadError, SourceError};
use listings_migrator_shared::SchemaError;
use thiserror::Error;

use crate::errors::{CheckpointError, MapperError, TransformError};

/// Errors that abort an entity type's pipeline (or, for schema errors, the run).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaError),

    #[error("Source error: {0}")]
    SourceError(#[from] SourceError),

    #[error("Load error: {0}")]
    LoadError(#[from] LoadError),

    /// Only surfaces in strict mode; otherwise transform failures are counted.
    #[error("Transform error: {0}")]
    TransformError(#[from] TransformError),

    #[error("Identifier mapper error: {0}")]
    MapperError(#[from] MapperError),

    #[error("Checkpoint error: {0}")]
    CheckpointError(#[from] CheckpointError),

    #[error("Target inspection error: {0}")]
    InspectorError(#[from] InspectorError),
}
