use listings_migrator_shared::{EntityType, SemanticType};
use thiserror::Error;

/// A single record could not be mapped onto the target schema.
///
/// Recoverable: the record is skipped and counted as failed unless the run is
/// in strict mode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("{entity_type} {source_id}: source field {field} is missing")]
    MissingSourceField {
        entity_type: EntityType,
        source_id: i64,
        field: String,
    },

    #[error("{entity_type} {source_id}: required field {field} is null")]
    MissingRequiredField {
        entity_type: EntityType,
        source_id: i64,
        field: String,
    },

    #[error("{entity_type} {source_id}: {field} references {references} {old_id}, which has not been migrated")]
    UnresolvedReference {
        entity_type: EntityType,
        source_id: i64,
        field: String,
        references: EntityType,
        old_id: i64,
    },

    #[error("{entity_type} {source_id}: value {value:?} of {field} has no mapping")]
    UnmappedEnumValue {
        entity_type: EntityType,
        source_id: i64,
        field: String,
        value: String,
    },

    #[error("{entity_type} {source_id}: field {field} expected {expected}, found {found}")]
    TypeMismatch {
        entity_type: EntityType,
        source_id: i64,
        field: String,
        expected: SemanticType,
        found: SemanticType,
    },
}

impl TransformError {
    /// Source id of the record that failed.
    pub fn source_id(&self) -> i64 {
        match self {
            TransformError::MissingSourceField { source_id, .. }
            | TransformError::MissingRequiredField { source_id, .. }
            | TransformError::UnresolvedReference { source_id, .. }
            | TransformError::UnmappedEnumValue { source_id, .. }
            | TransformError::TypeMismatch { source_id, .. } => *source_id,
        }
    }
}
