//! Orchestrator module for the listings migration.
//!
//! Drives source reader, transformer, loader, identifier mapper and checkpoint
//! controller batch by batch, one sequential worker per entity type. Entity
//! types run in dependency waves: every type of a wave runs concurrently, and a
//! type only starts once each selected parent completed.
//!
//! An error inside any worker is fatal for the whole run: the other workers of
//! the wave stop once their in-flight batch settles, and no later wave starts.

use futures::future::join_all;
use listings_migrator_repository::{
    BatchLoader, CheckpointRepository, SourceReader, TargetInspector,
};
use listings_migrator_shared::{
    EntityRecord, EntityRunStatus, EntitySchema, EntityStats, EntityType, LoadedId,
    MigrationSummary, SchemaCatalog,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::checkpoint::CheckpointController;
use crate::errors::OrchestratorError;
use crate::id_mapper::IdMapper;
use crate::loader::MigrationLoader;
use crate::transformer::SchemaTransformer;

/// Configuration for a migration run.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Records fetched, transformed and committed together.
    pub batch_size: i64,
    /// Run the full pipeline without writing to the target or checkpoint store.
    pub dry_run: bool,
    /// Offset override applied to every selected entity type.
    pub resume_from: Option<i64>,
    /// Treat a record that cannot be transformed as fatal for its entity type.
    pub strict: bool,
    /// Pause between batches.
    pub pace: Option<Duration>,
    /// Entity types to migrate; empty selects the whole catalog.
    pub only: Vec<EntityType>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            dry_run: false,
            resume_from: None,
            strict: false,
            pace: None,
            only: Vec::new(),
        }
    }
}

/// Progress notifications emitted while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationEvent {
    EntityStarted {
        entity_type: EntityType,
        total: u64,
        start_offset: i64,
    },
    BatchCommitted {
        entity_type: EntityType,
        offset: i64,
        processed: u64,
        migrated: u64,
        failed: u64,
    },
    RecordFailed {
        entity_type: EntityType,
        source_id: i64,
        reason: String,
    },
    EntityFinished(EntityStats),
}

/// Cooperative stop signal shared by every entity worker.
///
/// Workers check it before each fetch, so a batch that is already in flight
/// still commits and advances its checkpoint.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Orchestrator that coordinates the migration components.
pub struct Orchestrator {
    catalog: Arc<SchemaCatalog>,
    source: Arc<dyn SourceReader>,
    inspector: Arc<dyn TargetInspector>,
    loader: MigrationLoader,
    checkpoints: CheckpointController,
    transformer: SchemaTransformer,
    mapper: Arc<RwLock<IdMapper>>,
    options: MigrationOptions,
    shutdown: ShutdownHandle,
    /// Tripped by the first entity type that fails.
    abort: ShutdownHandle,
    failed_first: OnceLock<EntityType>,
    events: Option<mpsc::UnboundedSender<MigrationEvent>>,
}

impl Orchestrator {
    /// Creates a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Entity schemas to migrate
    /// * `source` - Legacy store reader
    /// * `batch_loader` - Target store writer
    /// * `inspector` - Target store reader, used to rebuild identifier mappings on
    ///   resume unless `batch_loader` keeps source ids
    /// * `checkpoints` - Checkpoint store
    /// * `options` - Run configuration
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        source: Arc<dyn SourceReader>,
        batch_loader: Arc<dyn BatchLoader>,
        inspector: Arc<dyn TargetInspector>,
        checkpoints: Arc<dyn CheckpointRepository>,
        mut options: MigrationOptions,
    ) -> Self {
        options.batch_size = options.batch_size.max(1);
        Self {
            catalog,
            source,
            inspector,
            loader: MigrationLoader::new(batch_loader, options.dry_run),
            checkpoints: CheckpointController::new(checkpoints, options.dry_run)
                .with_resume_override(options.resume_from),
            transformer: SchemaTransformer::new(),
            mapper: Arc::new(RwLock::new(IdMapper::new())),
            options,
            shutdown: ShutdownHandle::new(),
            abort: ShutdownHandle::new(),
            failed_first: OnceLock::new(),
            events: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<MigrationEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_transformer(mut self, transformer: SchemaTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Identifier mappings accumulated by the run.
    pub fn mapper(&self) -> Arc<RwLock<IdMapper>> {
        Arc::clone(&self.mapper)
    }

    pub fn checkpoints(&self) -> &CheckpointController {
        &self.checkpoints
    }

    /// Runs every selected entity type to completion, failure or interruption.
    ///
    /// Per-type failures are reported in the summary rather than returned; only
    /// problems that prevent the run from starting are errors. The first failure
    /// aborts the rest of the run.
    #[instrument(skip(self), fields(dry_run = self.options.dry_run))]
    pub async fn run(&self) -> Result<MigrationSummary, OrchestratorError> {
        let started = Instant::now();
        let selected = self.selected()?;
        info!(
            entity_types = ?selected.iter().map(|et| et.as_str()).collect::<Vec<_>>(),
            batch_size = self.options.batch_size,
            resume_from = ?self.options.resume_from,
            strict = self.options.strict,
            "Starting migration"
        );

        for schema in self.catalog.schemas() {
            if !selected.contains(&schema.entity_type) {
                continue;
            }
            for mapping in schema.lossy_enums() {
                warn!(
                    entity_type = %schema.entity_type,
                    field = %mapping.source,
                    target = %mapping.target,
                    "Lossy value mapping: distinct source values collapse onto one target value"
                );
            }
        }

        self.hydrate_unselected_parents(&selected).await?;

        let mut statuses: HashMap<EntityType, EntityRunStatus> = HashMap::new();
        let mut entities = Vec::with_capacity(selected.len());

        for wave in self.catalog.dependency_waves() {
            let mut runnable = Vec::new();
            for schema in wave {
                if !selected.contains(&schema.entity_type) {
                    continue;
                }
                if let Some(cause) = self.abort_cause() {
                    let stats = EntityStats::skipped(
                        schema.entity_type.clone(),
                        format!("run aborted after {} failed", cause),
                    );
                    self.emit(MigrationEvent::EntityFinished(stats.clone()));
                    statuses.insert(schema.entity_type.clone(), stats.status.clone());
                    entities.push(stats);
                    continue;
                }
                let blocked = schema.depends_on().into_iter().find(|parent| {
                    selected.contains(parent)
                        && statuses.get(parent) != Some(&EntityRunStatus::Completed)
                });
                match blocked {
                    Some(parent) => {
                        let stats = EntityStats::skipped(
                            schema.entity_type.clone(),
                            format!("dependency {} did not complete", parent),
                        );
                        warn!(entity_type = %schema.entity_type, dependency = %parent, "Skipping entity type");
                        self.emit(MigrationEvent::EntityFinished(stats.clone()));
                        statuses.insert(schema.entity_type.clone(), stats.status.clone());
                        entities.push(stats);
                    }
                    None => runnable.push(schema),
                }
            }

            let results = join_all(runnable.into_iter().map(|schema| self.run_entity(schema))).await;
            for stats in results {
                statuses.insert(stats.entity_type.clone(), stats.status.clone());
                entities.push(stats);
            }
        }

        let summary = MigrationSummary {
            entities,
            dry_run: self.options.dry_run,
            elapsed: started.elapsed(),
        };
        info!(
            processed = summary.total_processed(),
            migrated = summary.total_migrated(),
            failed = summary.total_failed(),
            succeeded = summary.succeeded(),
            interrupted = summary.interrupted(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Migration finished"
        );
        Ok(summary)
    }

    /// Like [`run`](Self::run), but Ctrl-C triggers a graceful shutdown.
    ///
    /// In-flight batches still commit; the summary reports the interrupted types.
    pub async fn run_until_interrupted(&self) -> Result<MigrationSummary, OrchestratorError> {
        let run = self.run();
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => return result,
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, finishing in-flight batches");
                self.shutdown.trigger();
            }
        }
        run.await
    }

    fn selected(&self) -> Result<HashSet<EntityType>, OrchestratorError> {
        if self.options.only.is_empty() {
            return Ok(self.catalog.entity_types().cloned().collect());
        }
        let mut selected = HashSet::new();
        for entity_type in &self.options.only {
            self.catalog.require(entity_type)?;
            selected.insert(entity_type.clone());
        }
        Ok(selected)
    }

    /// Loads mappings for parents that this run will not migrate itself.
    async fn hydrate_unselected_parents(
        &self,
        selected: &HashSet<EntityType>,
    ) -> Result<(), OrchestratorError> {
        let mut parents: Vec<EntityType> = Vec::new();
        for schema in self.catalog.schemas() {
            if !selected.contains(&schema.entity_type) {
                continue;
            }
            for parent in schema.depends_on() {
                if !selected.contains(&parent) && !parents.contains(&parent) {
                    parents.push(parent);
                }
            }
        }

        for parent in parents {
            let schema = self.catalog.require(&parent)?;
            self.hydrate(schema, None).await?;
        }
        Ok(())
    }

    /// Rebuilds mappings of `schema` up to `up_to_source_id`.
    ///
    /// Read from the target's correlation column, or straight from the source
    /// when the target keeps source ids as its own.
    async fn hydrate(
        &self,
        schema: &EntitySchema,
        up_to_source_id: Option<i64>,
    ) -> Result<usize, OrchestratorError> {
        let from_source = self.loader.keeps_source_ids();
        let loaded = if from_source {
            self.source
                .fetch_ids(schema, up_to_source_id)
                .await?
                .into_iter()
                .map(|id| LoadedId::new(id, id))
                .collect()
        } else {
            match self.inspector.load_id_mappings(schema, up_to_source_id).await {
                Ok(loaded) => loaded,
                Err(e) if self.options.dry_run => {
                    warn!(
                        entity_type = %schema.entity_type,
                        error = %e,
                        "Dry run: cannot read existing mappings from target"
                    );
                    return Ok(0);
                }
                Err(e) => return Err(e.into()),
            }
        };
        let added = self
            .mapper
            .write()
            .await
            .hydrate(&schema.entity_type, &loaded)?;
        info!(
            entity_type = %schema.entity_type,
            up_to_source_id = ?up_to_source_id,
            mappings = added,
            from = if from_source { "source" } else { "target" },
            "Rebuilt identifier mappings"
        );
        Ok(added)
    }

    async fn run_entity(&self, schema: &EntitySchema) -> EntityStats {
        let mut stats = EntityStats::new(schema.entity_type.clone(), 0);
        if let Err(e) = self.migrate_entity(schema, &mut stats).await {
            error!(entity_type = %schema.entity_type, error = %e, "Entity migration failed");
            if let Err(mark_err) = self.checkpoints.mark_failed(&schema.entity_type).await {
                error!(
                    entity_type = %schema.entity_type,
                    error = %mark_err,
                    "Failed to record failed checkpoint status"
                );
            }
            stats.status = EntityRunStatus::Failed(e.to_string());
            // Only the first failure is named as the cause.
            let _ = self.failed_first.set(schema.entity_type.clone());
            self.abort.trigger();
        }
        self.emit(MigrationEvent::EntityFinished(stats.clone()));
        stats
    }

    #[instrument(skip(self, schema, stats), fields(entity_type = %schema.entity_type))]
    async fn migrate_entity(
        &self,
        schema: &EntitySchema,
        stats: &mut EntityStats,
    ) -> Result<(), OrchestratorError> {
        let entity_type = &schema.entity_type;
        let mut offset = self.checkpoints.get_resume_offset(entity_type).await?;
        stats.start_offset = offset;
        stats.end_offset = offset;
        stats.total = self.source.count(schema).await?.max(0) as u64;

        if offset > 0 {
            let bound = self
                .source
                .fetch(schema, offset - 1, 1)
                .await?
                .last()
                .map(|record| record.source_id);
            self.hydrate(schema, bound).await?;
        }

        info!(total = stats.total, start_offset = offset, "Migrating entity type");
        self.emit(MigrationEvent::EntityStarted {
            entity_type: entity_type.clone(),
            total: stats.total,
            start_offset: offset,
        });

        loop {
            if let Some(cause) = self.abort_cause() {
                warn!(offset, cause = %cause, "Run aborted, stopping before next batch");
                stats.status = EntityRunStatus::Aborted(format!("{} failed", cause));
                return Ok(());
            }
            if self.shutdown.is_triggered() {
                info!(offset, "Shutdown requested, stopping before next batch");
                stats.status = EntityRunStatus::Interrupted;
                return Ok(());
            }

            let records = self
                .source
                .fetch(schema, offset, self.options.batch_size)
                .await?;
            if records.is_empty() {
                break;
            }

            self.process_batch(schema, &records, stats).await?;

            offset += records.len() as i64;
            let last_source_id = records.last().map(|record| record.source_id);
            self.checkpoints
                .advance(entity_type, offset, last_source_id)
                .await?;
            stats.end_offset = offset;

            debug!(
                offset,
                processed = stats.processed,
                migrated = stats.migrated,
                failed = stats.failed,
                "Batch committed"
            );
            self.emit(MigrationEvent::BatchCommitted {
                entity_type: entity_type.clone(),
                offset,
                processed: stats.processed,
                migrated: stats.migrated,
                failed: stats.failed,
            });

            if (records.len() as i64) < self.options.batch_size {
                break;
            }
            self.pace().await;
        }

        self.checkpoints.mark_completed(entity_type).await?;
        info!(
            processed = stats.processed,
            migrated = stats.migrated,
            failed = stats.failed,
            batches = stats.batches,
            "Entity type completed"
        );
        Ok(())
    }

    /// Transforms, loads and maps one batch.
    ///
    /// Nothing here touches the checkpoint; the caller advances it once this returns.
    async fn process_batch(
        &self,
        schema: &EntitySchema,
        records: &[EntityRecord],
        stats: &mut EntityStats,
    ) -> Result<(), OrchestratorError> {
        let mut transformed = Vec::with_capacity(records.len());
        {
            let mapper = self.mapper.read().await;
            for record in records {
                match self.transformer.transform(record, schema, &mapper) {
                    Ok(record) => transformed.push(record),
                    Err(e) if self.options.strict => return Err(e.into()),
                    Err(e) => {
                        warn!(source_id = e.source_id(), error = %e, "Skipping record");
                        stats.failed += 1;
                        self.emit(MigrationEvent::RecordFailed {
                            entity_type: schema.entity_type.clone(),
                            source_id: e.source_id(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        let loaded = self.loader.load(schema, &transformed).await?;
        self.mapper
            .write()
            .await
            .commit_batch(&schema.entity_type, &loaded)?;

        stats.processed += records.len() as u64;
        stats.migrated += loaded.len() as u64;
        stats.batches += 1;
        Ok(())
    }

    /// Sleeps for the configured pace, returning early on shutdown or abort.
    async fn pace(&self) {
        let Some(pace) = self.options.pace else {
            return;
        };
        let mut shutdown = self.shutdown.subscribe();
        let mut abort = self.abort.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(pace) => {}
            _ = shutdown.wait_for(|triggered| *triggered) => {}
            _ = abort.wait_for(|triggered| *triggered) => {}
        }
    }

    /// Entity type whose failure aborted the run, once one has failed.
    fn abort_cause(&self) -> Option<&EntityType> {
        if self.abort.is_triggered() {
            self.failed_first.get()
        } else {
            None
        }
    }

    fn emit(&self, event: MigrationEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is rendering progress.
            let _ = events.send(event);
        }
    }
}
