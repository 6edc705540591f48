use listings_migrator_shared::EntityType;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapperError {
    /// The same source id was mapped twice: a batch was processed again
    /// without a matching checkpoint advance.
    #[error("Duplicate mapping for {entity_type} {old_id}: already mapped to {existing}, got {attempted}")]
    DuplicateMapping {
        entity_type: EntityType,
        old_id: i64,
        existing: i64,
        attempted: i64,
    },

    #[error("No mapping for {entity_type} {old_id}")]
    NotFound { entity_type: EntityType, old_id: i64 },
}
