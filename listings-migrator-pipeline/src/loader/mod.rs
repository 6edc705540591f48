//! This module defines the `MigrationLoader`, the pipeline stage that persists
//! transformed batches through a [`BatchLoader`].
pub use listings_migrator_repository::{BatchLoader, LoadError};
use listings_migrator_shared::{EntitySchema, LoadedId, TransformedRecord};
use std::sync::Arc;
use tracing::debug;

/// `MigrationLoader` persists one batch per call.
///
/// In dry-run mode nothing is written: every record reports its own source id as
/// its new id, so downstream foreign keys still resolve and the rest of the
/// pipeline behaves exactly as in a real run.
pub struct MigrationLoader {
    batch_loader: Arc<dyn BatchLoader>,
    dry_run: bool,
}

impl MigrationLoader {
    /// Creates a new `MigrationLoader`.
    ///
    /// # Arguments
    ///
    /// * `batch_loader` - Target-store writer
    /// * `dry_run` - When true, batches are never handed to `batch_loader`
    pub fn new(batch_loader: Arc<dyn BatchLoader>, dry_run: bool) -> Self {
        Self {
            batch_loader,
            dry_run,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Whether the target reports source ids as new ids.
    pub fn keeps_source_ids(&self) -> bool {
        self.batch_loader.keeps_source_ids()
    }

    /// Persists a batch, returning one identifier pair per record in input order.
    ///
    /// # Returns
    ///
    /// A `Result` with the identifier pairs, or a `LoadError` if the batch was
    /// rolled back.
    pub async fn load(
        &self,
        schema: &EntitySchema,
        records: &[TransformedRecord],
    ) -> Result<Vec<LoadedId>, LoadError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if self.dry_run {
            debug!(
                entity_type = %schema.entity_type,
                records = records.len(),
                "Dry run: skipping batch write"
            );
            return Ok(records
                .iter()
                .map(|record| LoadedId::new(record.source_id, record.source_id))
                .collect());
        }

        let loaded = self.batch_loader.load_batch(schema, records).await?;
        if let Some(missing) = records
            .iter()
            .find(|record| !loaded.iter().any(|id| id.source_id == record.source_id))
        {
            return Err(LoadError::MissingReturnedId {
                entity_type: schema.entity_type.to_string(),
                source_id: missing.source_id,
            });
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use listings_migrator_shared::{listings_catalog, EntityType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock loader assigning new ids from 1000, optionally dropping the last one.
    struct MockBatchLoader {
        calls: AtomicUsize,
        drop_last: bool,
    }

    impl MockBatchLoader {
        fn new(drop_last: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                drop_last,
            }
        }
    }

    #[async_trait]
    impl BatchLoader for MockBatchLoader {
        async fn load_batch(
            &self,
            _schema: &EntitySchema,
            records: &[TransformedRecord],
        ) -> Result<Vec<LoadedId>, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut ids: Vec<LoadedId> = records
                .iter()
                .enumerate()
                .map(|(i, record)| LoadedId::new(record.source_id, 1000 + i as i64))
                .collect();
            if self.drop_last {
                ids.pop();
            }
            Ok(ids)
        }
    }

    fn records(ids: &[i64]) -> Vec<TransformedRecord> {
        ids.iter()
            .map(|id| TransformedRecord {
                entity_type: EntityType::from("category"),
                source_id: *id,
                target_table: "categories".into(),
                secondary_id: None,
                fields: Vec::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_load_returns_target_ids() {
        let catalog = listings_catalog().unwrap();
        let schema = catalog.require(&EntityType::from("category")).unwrap();
        let mock = Arc::new(MockBatchLoader::new(false));
        let loader = MigrationLoader::new(mock.clone(), false);

        let loaded = loader.load(schema, &records(&[10, 11])).await.unwrap();

        assert_eq!(loaded, vec![LoadedId::new(10, 1000), LoadedId::new(11, 1001)]);
        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let catalog = listings_catalog().unwrap();
        let schema = catalog.require(&EntityType::from("category")).unwrap();
        let mock = Arc::new(MockBatchLoader::new(false));
        let loader = MigrationLoader::new(mock.clone(), true);

        let loaded = loader.load(schema, &records(&[10, 11])).await.unwrap();

        assert_eq!(loaded, vec![LoadedId::new(10, 10), LoadedId::new(11, 11)]);
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
        assert!(loader.is_dry_run());
    }

    #[tokio::test]
    async fn test_missing_returned_id_is_an_error() {
        let catalog = listings_catalog().unwrap();
        let schema = catalog.require(&EntityType::from("category")).unwrap();
        let loader = MigrationLoader::new(Arc::new(MockBatchLoader::new(true)), false);

        let err = loader.load(schema, &records(&[10, 11])).await.unwrap_err();

        assert!(matches!(err, LoadError::MissingReturnedId { source_id: 11, .. }));
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let catalog = listings_catalog().unwrap();
        let schema = catalog.require(&EntityType::from("category")).unwrap();
        let mock = Arc::new(MockBatchLoader::new(false));
        let loader = MigrationLoader::new(mock.clone(), false);

        assert!(loader.load(schema, &[]).await.unwrap().is_empty());
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }
}
