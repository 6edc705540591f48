//! Checkpoint controller.
//!
//! Owns the resume offset of every entity type for the duration of a run. The
//! stored checkpoint is advanced only after a batch committed, so a crash between
//! commit and advance replays at most one batch, which the upserting loader
//! absorbs.

use chrono::Utc;
use listings_migrator_repository::CheckpointRepository;
use listings_migrator_shared::{BatchCheckpoint, CheckpointStatus, EntityType};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::CheckpointError;

pub struct CheckpointController {
    repository: Arc<dyn CheckpointRepository>,
    dry_run: bool,
    resume_override: Option<i64>,
    cache: Mutex<HashMap<EntityType, BatchCheckpoint>>,
}

impl CheckpointController {
    /// Creates a controller over a checkpoint store.
    ///
    /// # Arguments
    ///
    /// * `repository` - Where checkpoints are persisted
    /// * `dry_run` - When true, checkpoints are tracked in memory only and the
    ///   store is never written
    pub fn new(repository: Arc<dyn CheckpointRepository>, dry_run: bool) -> Self {
        Self {
            repository,
            dry_run,
            resume_override: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Operator-supplied offset that wins over every stored checkpoint.
    pub fn with_resume_override(mut self, offset: Option<i64>) -> Self {
        self.resume_override = offset;
        self
    }

    /// Offset the next batch of `entity_type` starts at.
    ///
    /// Zero when nothing is stored. Also primes the in-memory checkpoint that
    /// later [`advance`](Self::advance) calls are checked against.
    pub async fn get_resume_offset(&self, entity_type: &EntityType) -> Result<i64, CheckpointError> {
        let stored = self.load(entity_type).await?;
        let mut checkpoint = stored.unwrap_or_else(|| BatchCheckpoint::pending(entity_type.clone()));

        if let Some(offset) = self.resume_override {
            if offset != checkpoint.last_committed_offset {
                info!(
                    entity_type = %entity_type,
                    stored_offset = checkpoint.last_committed_offset,
                    resume_from = offset,
                    "Overriding stored checkpoint"
                );
            }
            checkpoint.last_committed_offset = offset;
            checkpoint.last_source_id = None;
        }

        let offset = checkpoint.last_committed_offset;
        self.cache.lock().await.insert(entity_type.clone(), checkpoint);
        Ok(offset)
    }

    /// Records that every source row before `new_offset` has been handled.
    ///
    /// # Arguments
    ///
    /// * `entity_type` - Entity type whose batch just committed
    /// * `new_offset` - Offset right after the committed batch
    /// * `last_source_id` - Primary key of the batch's final source row
    ///
    /// # Errors
    ///
    /// `OutOfOrder` when `new_offset` does not move past the current offset.
    pub async fn advance(
        &self,
        entity_type: &EntityType,
        new_offset: i64,
        last_source_id: Option<i64>,
    ) -> Result<BatchCheckpoint, CheckpointError> {
        let mut checkpoint = self.current(entity_type).await?;
        if new_offset <= checkpoint.last_committed_offset {
            return Err(CheckpointError::OutOfOrder {
                entity_type: entity_type.clone(),
                current: checkpoint.last_committed_offset,
                attempted: new_offset,
            });
        }

        checkpoint.last_committed_offset = new_offset;
        checkpoint.last_source_id = last_source_id;
        checkpoint.status = CheckpointStatus::InProgress;
        checkpoint.updated_at = Utc::now();
        self.store(checkpoint).await
    }

    pub async fn mark_completed(&self, entity_type: &EntityType) -> Result<BatchCheckpoint, CheckpointError> {
        self.set_status(entity_type, CheckpointStatus::Completed).await
    }

    pub async fn mark_failed(&self, entity_type: &EntityType) -> Result<BatchCheckpoint, CheckpointError> {
        self.set_status(entity_type, CheckpointStatus::Failed).await
    }

    /// Last known checkpoint of an entity type, if any.
    pub async fn checkpoint(&self, entity_type: &EntityType) -> Result<Option<BatchCheckpoint>, CheckpointError> {
        if let Some(cached) = self.cache.lock().await.get(entity_type) {
            return Ok(Some(cached.clone()));
        }
        self.load(entity_type).await
    }

    async fn set_status(
        &self,
        entity_type: &EntityType,
        status: CheckpointStatus,
    ) -> Result<BatchCheckpoint, CheckpointError> {
        let mut checkpoint = self.current(entity_type).await?;
        checkpoint.status = status;
        checkpoint.updated_at = Utc::now();
        self.store(checkpoint).await
    }

    async fn current(&self, entity_type: &EntityType) -> Result<BatchCheckpoint, CheckpointError> {
        Ok(self
            .checkpoint(entity_type)
            .await?
            .unwrap_or_else(|| BatchCheckpoint::pending(entity_type.clone())))
    }

    async fn store(&self, checkpoint: BatchCheckpoint) -> Result<BatchCheckpoint, CheckpointError> {
        if !self.dry_run {
            self.repository.save_checkpoint(&checkpoint).await?;
        }
        self.cache
            .lock()
            .await
            .insert(checkpoint.entity_type.clone(), checkpoint.clone());
        Ok(checkpoint)
    }

    async fn load(&self, entity_type: &EntityType) -> Result<Option<BatchCheckpoint>, CheckpointError> {
        match self.repository.get_checkpoint(entity_type).await {
            Ok(checkpoint) => Ok(checkpoint),
            // A dry run may target a database whose checkpoint table does not exist yet.
            Err(e) if self.dry_run => {
                warn!(
                    entity_type = %entity_type,
                    error = %e,
                    "Dry run: checkpoint unavailable, starting from zero"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
