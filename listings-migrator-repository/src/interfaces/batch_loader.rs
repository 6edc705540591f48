use async_trait::async_trait;
use listings_migrator_shared::{EntitySchema, LoadedId, TransformedRecord};

use crate::errors::LoadError;

/// Writes transformed batches to a target system.
///
/// Writes are "insert or update to the same result": loading the same batch
/// twice must leave the target exactly as loading it once.
#[async_trait]
pub trait BatchLoader: Send + Sync {
    /// Persist one batch atomically.
    ///
    /// # Arguments
    ///
    /// * `schema` - Schema of the entity type being loaded
    /// * `records` - Transformed records, all sharing the same column layout
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<LoadedId>)` - One identifier pair per input record, in input order
    /// * `Err(LoadError)` - Nothing from the batch was persisted
    async fn load_batch(
        &self,
        schema: &EntitySchema,
        records: &[TransformedRecord],
    ) -> Result<Vec<LoadedId>, LoadError>;

    /// True when the loader reports each record's source id as its new id.
    ///
    /// Identifier mappings for such a target are rebuilt from the source instead
    /// of being read back from the target's correlation column.
    fn keeps_source_ids(&self) -> bool {
        false
    }
}
