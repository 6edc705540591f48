use async_trait::async_trait;
use listings_migrator_shared::{BatchCheckpoint, EntityType};

use crate::errors::CheckpointRepositoryError;

/// Persistence for per-entity-type batch checkpoints.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    async fn get_checkpoint(
        &self,
        entity_type: &EntityType,
    ) -> Result<Option<BatchCheckpoint>, CheckpointRepositoryError>;

    async fn save_checkpoint(
        &self,
        checkpoint: &BatchCheckpoint,
    ) -> Result<(), CheckpointRepositoryError>;
}
