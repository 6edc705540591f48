use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listings_migrator_shared::{EntitySchema, ForeignKey, GeoColumns, LoadedId, RequiredRule};

use crate::errors::InspectorError;
use crate::types::{OffendingRows, TargetRow};

/// Read-only queries against the target store.
///
/// Used by the validator and to rebuild identifier mappings from the target's
/// correlation column when a run resumes. Every query is scoped to the schema's
/// discriminator tag when it has one.
#[async_trait]
pub trait TargetInspector: Send + Sync {
    /// Count target rows of an entity type.
    async fn count(&self, schema: &EntitySchema) -> Result<i64, InspectorError>;

    /// Whether a table exists in the target's current schema.
    async fn table_exists(&self, table: &str) -> Result<bool, InspectorError>;

    /// Rows of an entity type with no correlation id, i.e. rows the migrator
    /// did not write.
    async fn count_unmapped(&self, schema: &EntitySchema) -> Result<i64, InspectorError>;

    /// Rows whose non-null foreign key has no matching parent row.
    ///
    /// # Arguments
    ///
    /// * `schema` - Schema of the referencing entity type
    /// * `fk` - The foreign key column being checked
    /// * `parent` - Schema of the referenced entity type
    /// * `limit` - Maximum number of offending ids to return
    async fn find_orphans(
        &self,
        schema: &EntitySchema,
        fk: &ForeignKey,
        parent: &EntitySchema,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError>;

    /// Rows violating a completeness rule.
    async fn find_required_violations(
        &self,
        schema: &EntitySchema,
        rule: &RequiredRule,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError>;

    /// Rows whose latitude or longitude is outside valid bounds.
    async fn find_invalid_coordinates(
        &self,
        schema: &EntitySchema,
        geo: &GeoColumns,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError>;

    /// Rows whose timestamp column is later than `now`.
    async fn find_future_timestamps(
        &self,
        schema: &EntitySchema,
        column: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError>;

    /// Random sample of correlation ids (source primary keys) present in the target.
    async fn sample_legacy_ids(
        &self,
        schema: &EntitySchema,
        size: i64,
    ) -> Result<Vec<i64>, InspectorError>;

    /// Re-read target rows by correlation id, projecting the given columns.
    async fn fetch_by_legacy_ids(
        &self,
        schema: &EntitySchema,
        legacy_ids: &[i64],
        columns: &[String],
    ) -> Result<Vec<TargetRow>, InspectorError>;

    /// Dependent rows of one target parent, ordered by `order`.
    async fn fetch_children(
        &self,
        child: &EntitySchema,
        parent_field: &str,
        parent_id: i64,
        order: &[String],
        columns: &[String],
    ) -> Result<Vec<TargetRow>, InspectorError>;

    /// Identifier pairs recoverable from the correlation column.
    ///
    /// With `up_to_legacy_id` set, only rows whose correlation id is at most that
    /// value are returned.
    async fn load_id_mappings(
        &self,
        schema: &EntitySchema,
        up_to_legacy_id: Option<i64>,
    ) -> Result<Vec<LoadedId>, InspectorError>;
}
