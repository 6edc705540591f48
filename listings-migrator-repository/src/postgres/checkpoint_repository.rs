//! PostgreSQL implementation of the checkpoint repository.
//!
//! Stores one row per entity type in `migration_checkpoints` on the target store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listings_migrator_shared::{BatchCheckpoint, CheckpointStatus, EntityType};

use crate::errors::CheckpointRepositoryError;
use crate::interfaces::CheckpointRepository;

/// PostgreSQL-backed checkpoint repository.
///
/// Persists checkpoints with upserts so each save atomically replaces the row.
pub struct PostgresCheckpointRepository {
    /// PostgreSQL connection pool
    pool: sqlx::PgPool,
}

impl PostgresCheckpointRepository {
    /// Creates a new checkpoint repository instance.
    ///
    /// # Arguments
    ///
    /// * `pool` - Target store pool; must contain the `migration_checkpoints` table
    ///   (see [`Self::run_migrations`])
    ///
    /// # Returns
    ///
    /// * `Ok(PostgresCheckpointRepository)` - Ready-to-use repository instance
    /// * `Err(CheckpointRepositoryError)` - If the target does not answer a trivial query
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, CheckpointRepositoryError> {
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Applies the bundled migrations creating the checkpoint table.
    pub async fn run_migrations(&self) -> Result<(), CheckpointRepositoryError> {
        sqlx::migrate!("./src/postgres/migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointRepository for PostgresCheckpointRepository {
    async fn get_checkpoint(
        &self,
        entity_type: &EntityType,
    ) -> Result<Option<BatchCheckpoint>, CheckpointRepositoryError> {
        let row: Option<(i64, Option<i64>, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT last_committed_offset, last_source_id, status, updated_at FROM migration_checkpoints WHERE entity_type = $1",
        )
        .bind(entity_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(offset, last_source_id, status, updated_at)| {
            let status = status
                .parse::<CheckpointStatus>()
                .map_err(CheckpointRepositoryError::InvalidStatus)?;
            Ok(BatchCheckpoint {
                entity_type: entity_type.clone(),
                last_committed_offset: offset,
                last_source_id,
                status,
                updated_at,
            })
        })
        .transpose()
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &BatchCheckpoint,
    ) -> Result<(), CheckpointRepositoryError> {
        sqlx::query(
            "INSERT INTO migration_checkpoints (entity_type, last_committed_offset, last_source_id, status, updated_at) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (entity_type) DO UPDATE SET last_committed_offset = EXCLUDED.last_committed_offset, last_source_id = EXCLUDED.last_source_id, status = EXCLUDED.status, updated_at = EXCLUDED.updated_at",
        )
        .bind(checkpoint.entity_type.as_str())
        .bind(checkpoint.last_committed_offset)
        .bind(checkpoint.last_source_id)
        .bind(checkpoint.status.as_str())
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
