use thiserror::Error;

/// Errors raised by read-only validation queries against the target store.
#[derive(Debug, Error)]
pub enum InspectorError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Column {column} is not declared for {entity_type}")]
    UnknownColumn { entity_type: String, column: String },
}
