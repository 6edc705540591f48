use thiserror::Error;

/// Errors raised while writing a batch to the target store.
///
/// Any of these means the batch was rolled back (or, for document targets, must
/// be retried as a whole).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    #[error("Records of one batch disagree on target columns: {0}")]
    InconsistentColumns(String),

    #[error("No identifier returned for {entity_type} source id {source_id}")]
    MissingReturnedId { entity_type: String, source_id: i64 },

    #[error("Index error: {0}")]
    IndexError(String),
}

impl LoadError {
    pub fn index(msg: impl Into<String>) -> Self {
        Self::IndexError(msg.into())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::TargetUnavailable(_))
    }
}

impl From<sqlx::Error> for LoadError {
    fn from(err: sqlx::Error) -> Self {
        if super::is_connectivity_error(&err) {
            Self::TargetUnavailable(err.to_string())
        } else {
            Self::DatabaseError(err)
        }
    }
}
