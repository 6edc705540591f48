use listings_migrator_repository::CheckpointRepositoryError;
use listings_migrator_shared::EntityType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint repository error: {0}")]
    RepositoryError(#[from] CheckpointRepositoryError),

    #[error("Checkpoint for {entity_type} must move forward: current {current}, attempted {attempted}")]
    OutOfOrder {
        entity_type: EntityType,
        current: i64,
        attempted: i64,
    },
}
