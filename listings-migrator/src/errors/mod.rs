//! Top-level error type of the migrator binary.

use listings_migrator_pipeline::{OrchestratorError, PreflightError, ValidationError};
use listings_migrator_repository::CheckpointRepositoryError;
use thiserror::Error;

/// Errors that stop a command before it can produce a summary or report.
#[derive(Error, Debug)]
pub enum MigratorError {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("Checkpoint store error: {0}")]
    CheckpointError(#[from] CheckpointRepositoryError),

    /// A required table is missing or a store could not be inspected.
    #[error("Preflight failed: {0}")]
    PreflightError(#[from] PreflightError),

    #[error("Migration error: {0}")]
    OrchestratorError(#[from] OrchestratorError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Output error: {0}")]
    OutputError(#[from] serde_json::Error),
}

impl MigratorError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    pub fn target_unavailable(msg: impl Into<String>) -> Self {
        Self::TargetUnavailable(msg.into())
    }
}
