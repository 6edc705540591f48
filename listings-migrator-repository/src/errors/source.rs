use thiserror::Error;

/// Errors raised while reading the source store.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Source query error: {0}")]
    QueryError(sqlx::Error),

    #[error("Failed to decode column {column} of {entity_type}: {message}")]
    DecodeError {
        entity_type: String,
        column: String,
        message: String,
    },
}

impl SourceError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for SourceError {
    fn from(err: sqlx::Error) -> Self {
        if super::is_connectivity_error(&err) {
            Self::Unavailable(err.to_string())
        } else {
            Self::QueryError(err)
        }
    }
}
