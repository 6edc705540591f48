use async_trait::async_trait;
use listings_migrator_shared::{EntityRecord, EntitySchema};

use crate::errors::SourceError;

/// Read-only access to the legacy source store.
///
/// Implementations must return records in ascending primary-key order so that
/// repeated calls with the same offset and limit are deterministic; checkpoint
/// based resume relies on it.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Fetch one page of records.
    ///
    /// # Arguments
    ///
    /// * `schema` - Schema of the entity type being read
    /// * `offset` - Number of records (in primary-key order) to skip
    /// * `limit` - Maximum number of records to return
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<EntityRecord>)` - The page; empty once `offset` reaches the end
    /// * `Err(SourceError)` - If the source cannot be reached or queried
    async fn fetch(
        &self,
        schema: &EntitySchema,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<EntityRecord>, SourceError>;

    /// Count the active records of an entity type.
    async fn count(&self, schema: &EntitySchema) -> Result<i64, SourceError>;

    /// Whether a table exists in the source's current schema.
    async fn table_exists(&self, table: &str) -> Result<bool, SourceError>;

    /// Primary keys of the active records in ascending order, optionally only
    /// those at or below `up_to_id`.
    async fn fetch_ids(
        &self,
        schema: &EntitySchema,
        up_to_id: Option<i64>,
    ) -> Result<Vec<i64>, SourceError>;

    /// Fetch specific records by source primary key, in ascending key order.
    async fn fetch_by_ids(
        &self,
        schema: &EntitySchema,
        ids: &[i64],
    ) -> Result<Vec<EntityRecord>, SourceError>;

    /// Fetch the dependent records of one parent, ordered by `order`.
    async fn fetch_children(
        &self,
        child: &EntitySchema,
        parent_field: &str,
        parent_id: i64,
        order: &[String],
    ) -> Result<Vec<EntityRecord>, SourceError>;
}
