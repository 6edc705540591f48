//! In-memory source, target and checkpoint stores for pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use listings_migrator_repository::{
    BatchLoader, CheckpointRepository, CheckpointRepositoryError, InspectorError, LoadError,
    OffendingRows, SourceError, SourceReader, TargetInspector, TargetRow,
};
use listings_migrator_shared::{
    listings_catalog, BatchCheckpoint, EntityRecord, EntitySchema, EntityType, FieldValue,
    ForeignKey, GeoColumns, LoadedId, RequiredRule, SchemaCatalog, TransformedRecord,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

pub fn catalog() -> Arc<SchemaCatalog> {
    Arc::new(listings_catalog().unwrap())
}

pub fn et(name: &str) -> EntityType {
    EntityType::from(name)
}

pub fn price(value: &str) -> FieldValue {
    FieldValue::Decimal(BigDecimal::from_str(value).unwrap())
}

fn compare_values(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    let key = |value: Option<&FieldValue>| value.and_then(FieldValue::as_f64);
    match (key(a), key(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a
            .and_then(FieldValue::as_str)
            .cmp(&b.and_then(FieldValue::as_str)),
    }
}

// ============================================================================
// Source
// ============================================================================

/// Legacy store: rows per entity type, always served in primary-key order.
pub struct MemorySource {
    catalog: Arc<SchemaCatalog>,
    rows: Mutex<HashMap<EntityType, BTreeMap<i64, EntityRecord>>>,
    fetches: Mutex<HashMap<EntityType, Vec<i64>>>,
    dropped_tables: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            catalog,
            rows: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
            dropped_tables: Mutex::new(Vec::new()),
        }
    }

    pub fn drop_table(&self, table: &str) {
        self.dropped_tables.lock().unwrap().push(table.to_string());
    }

    /// Offsets of every paged fetch of `entity_type`, in call order.
    pub fn fetches(&self, entity_type: &str) -> Vec<i64> {
        self.fetches
            .lock()
            .unwrap()
            .get(&et(entity_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Inserts a row; every source column the schema reads defaults to null.
    pub fn insert(&self, entity_type: &str, id: i64, values: &[(&str, FieldValue)]) {
        let entity_type = et(entity_type);
        let schema = self.catalog.require(&entity_type).unwrap();
        let mut record = EntityRecord::new(entity_type.clone(), id);
        for (column, _) in schema.source_columns() {
            record.fields.insert(column, FieldValue::Null);
        }
        for (column, value) in values {
            record.fields.insert(column.to_string(), value.clone());
        }
        self.rows
            .lock()
            .unwrap()
            .entry(entity_type)
            .or_default()
            .insert(id, record);
    }

    pub fn category(&self, id: i64, name: &str) {
        self.insert(
            "category",
            id,
            &[
                ("name", FieldValue::text(name)),
                ("slug", FieldValue::text(name.to_lowercase())),
            ],
        );
    }

    pub fn storefront(&self, id: i64, name: &str) {
        self.insert(
            "storefront",
            id,
            &[
                ("user_id", FieldValue::Integer(7)),
                ("name", FieldValue::text(name)),
                ("slug", FieldValue::text(name.to_lowercase())),
            ],
        );
    }

    pub fn listing(&self, id: i64, category_id: i64, title: &str) {
        self.insert(
            "listing",
            id,
            &[
                ("user_id", FieldValue::Integer(7)),
                ("title", FieldValue::text(title)),
                ("price", price("450.00")),
                ("status", FieldValue::text("active")),
                ("latitude", FieldValue::Float(45.25)),
                ("longitude", FieldValue::Float(19.84)),
                ("category_id", FieldValue::Integer(category_id)),
            ],
        );
    }

    pub fn image(&self, id: i64, listing_id: i64, order: i64, url: &str) {
        self.insert(
            "image",
            id,
            &[
                ("public_url", FieldValue::text(url)),
                ("file_path", FieldValue::text(format!("raw/{}", id))),
                ("display_order", FieldValue::Integer(order)),
                ("listing_id", FieldValue::Integer(listing_id)),
            ],
        );
    }

    fn all(&self, entity_type: &EntityType) -> Vec<EntityRecord> {
        self.rows
            .lock()
            .unwrap()
            .get(entity_type)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn fetch(
        &self,
        schema: &EntitySchema,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<EntityRecord>, SourceError> {
        self.fetches
            .lock()
            .unwrap()
            .entry(schema.entity_type.clone())
            .or_default()
            .push(offset);
        Ok(self
            .all(&schema.entity_type)
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, schema: &EntitySchema) -> Result<i64, SourceError> {
        Ok(self.all(&schema.entity_type).len() as i64)
    }

    async fn table_exists(&self, table: &str) -> Result<bool, SourceError> {
        Ok(!self.dropped_tables.lock().unwrap().iter().any(|t| t == table))
    }

    async fn fetch_ids(
        &self,
        schema: &EntitySchema,
        up_to_id: Option<i64>,
    ) -> Result<Vec<i64>, SourceError> {
        Ok(self
            .all(&schema.entity_type)
            .iter()
            .map(|record| record.source_id)
            .filter(|id| up_to_id.map(|bound| *id <= bound).unwrap_or(true))
            .collect())
    }

    async fn fetch_by_ids(
        &self,
        schema: &EntitySchema,
        ids: &[i64],
    ) -> Result<Vec<EntityRecord>, SourceError> {
        Ok(self
            .all(&schema.entity_type)
            .into_iter()
            .filter(|record| ids.contains(&record.source_id))
            .collect())
    }

    async fn fetch_children(
        &self,
        child: &EntitySchema,
        parent_field: &str,
        parent_id: i64,
        order: &[String],
    ) -> Result<Vec<EntityRecord>, SourceError> {
        let mut children: Vec<EntityRecord> = self
            .all(&child.entity_type)
            .into_iter()
            .filter(|record| record.get(parent_field).and_then(FieldValue::as_i64) == Some(parent_id))
            .collect();
        children.sort_by(|a, b| {
            order
                .iter()
                .map(|column| {
                    if column == &child.source.primary_key {
                        a.source_id.cmp(&b.source_id)
                    } else {
                        compare_values(a.get(column), b.get(column))
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(children)
    }
}

// ============================================================================
// Target
// ============================================================================

#[derive(Debug, Clone)]
pub struct StoredRow {
    pub id: i64,
    pub legacy_id: i64,
    pub tag: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl StoredRow {
    pub fn get(&self, column: &str) -> &FieldValue {
        self.fields.get(column).unwrap_or(&FieldValue::Null)
    }
}

/// Unified target store: upserts keyed by `(tag, legacy_id)`, ids from 1000 up.
pub struct MemoryTarget {
    tables: Mutex<HashMap<String, Vec<StoredRow>>>,
    next_id: AtomicI64,
    load_calls: Mutex<HashMap<EntityType, usize>>,
    loaded_records: Mutex<HashMap<EntityType, usize>>,
    fail_at: Mutex<HashMap<EntityType, usize>>,
    hydrations: Mutex<HashMap<EntityType, Vec<Option<i64>>>>,
    /// Rows the migrator did not write, per `(table, tag)`.
    unmapped: Mutex<HashMap<(String, Option<String>), i64>>,
    dropped_tables: Mutex<Vec<String>>,
    inspection_broken: AtomicBool,
}

impl Default for MemoryTarget {
    fn default() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1000),
            load_calls: Mutex::new(HashMap::new()),
            loaded_records: Mutex::new(HashMap::new()),
            fail_at: Mutex::new(HashMap::new()),
            hydrations: Mutex::new(HashMap::new()),
            unmapped: Mutex::new(HashMap::new()),
            dropped_tables: Mutex::new(Vec::new()),
            inspection_broken: AtomicBool::new(false),
        }
    }
}

impl MemoryTarget {
    /// Makes the `call`-th load of `entity_type` (1-based) fail once.
    pub fn fail_load_at(&self, entity_type: &str, call: usize) {
        self.fail_at.lock().unwrap().insert(et(entity_type), call);
    }

    pub fn drop_table(&self, table: &str) {
        self.dropped_tables.lock().unwrap().push(table.to_string());
    }

    /// Pretends `table` already holds `count` rows created outside the migrator.
    pub fn add_unmapped_rows(&self, table: &str, tag: Option<&str>, count: i64) {
        *self
            .unmapped
            .lock()
            .unwrap()
            .entry((table.to_string(), tag.map(str::to_string)))
            .or_default() += count;
    }

    pub fn break_inspection(&self) {
        self.inspection_broken.store(true, AtomicOrdering::SeqCst);
    }

    /// Upper bounds of every mapping read-back of `entity_type`, in call order.
    pub fn hydrations(&self, entity_type: &str) -> Vec<Option<i64>> {
        self.hydrations
            .lock()
            .unwrap()
            .get(&et(entity_type))
            .cloned()
            .unwrap_or_default()
    }

    pub fn load_calls(&self, entity_type: &str) -> usize {
        self.load_calls.lock().unwrap().get(&et(entity_type)).copied().unwrap_or(0)
    }

    /// Records handed to successful loads, counting replays.
    pub fn loaded_records(&self, entity_type: &str) -> usize {
        self.loaded_records
            .lock()
            .unwrap()
            .get(&et(entity_type))
            .copied()
            .unwrap_or(0)
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        let mut rows = self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|row| row.id);
        rows
    }

    pub fn row(&self, table: &str, legacy_id: i64) -> Option<StoredRow> {
        self.rows(table).into_iter().find(|row| row.legacy_id == legacy_id)
    }

    /// Overwrites one column of a stored row, for corrupting migrated data.
    pub fn set_field(&self, table: &str, legacy_id: i64, column: &str, value: FieldValue) {
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| row.legacy_id == legacy_id))
            .unwrap();
        row.fields.insert(column.to_string(), value);
    }

    pub fn delete(&self, table: &str, legacy_id: i64) {
        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.retain(|row| row.legacy_id != legacy_id);
        }
    }

    fn scoped(&self, schema: &EntitySchema) -> Result<Vec<StoredRow>, InspectorError> {
        if self.inspection_broken.load(AtomicOrdering::SeqCst) {
            return Err(InspectorError::UnknownColumn {
                entity_type: schema.entity_type.to_string(),
                column: "inspection disabled".into(),
            });
        }
        let tag = schema.target.discriminator.as_ref().map(|d| d.tag.clone());
        Ok(self
            .rows(&schema.target.table)
            .into_iter()
            .filter(|row| row.tag == tag)
            .collect())
    }

    fn offending(
        &self,
        schema: &EntitySchema,
        limit: i64,
        predicate: impl Fn(&StoredRow) -> bool,
    ) -> Result<OffendingRows, InspectorError> {
        let ids: Vec<i64> = self
            .scoped(schema)?
            .into_iter()
            .filter(|row| predicate(row))
            .map(|row| row.id)
            .collect();
        Ok(OffendingRows {
            count: ids.len() as i64,
            sample_ids: ids.into_iter().take(limit as usize).collect(),
        })
    }

    fn project(row: &StoredRow, columns: &[String]) -> TargetRow {
        TargetRow {
            id: row.id,
            legacy_id: row.legacy_id,
            fields: columns
                .iter()
                .map(|column| (column.clone(), row.get(column).clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl BatchLoader for MemoryTarget {
    async fn load_batch(
        &self,
        schema: &EntitySchema,
        records: &[TransformedRecord],
    ) -> Result<Vec<LoadedId>, LoadError> {
        // Lets concurrent entity types interleave their batches.
        tokio::task::yield_now().await;
        let call = {
            let mut calls = self.load_calls.lock().unwrap();
            let count = calls.entry(schema.entity_type.clone()).or_default();
            *count += 1;
            *count
        };
        {
            let mut fail_at = self.fail_at.lock().unwrap();
            if fail_at.get(&schema.entity_type) == Some(&call) {
                fail_at.remove(&schema.entity_type);
                return Err(LoadError::TargetUnavailable(format!(
                    "injected failure on {} load {}",
                    schema.entity_type, call
                )));
            }
        }

        let tag = schema.target.discriminator.as_ref().map(|d| d.tag.clone());
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(schema.target.table.clone()).or_default();
        let mut loaded = Vec::with_capacity(records.len());
        for record in records {
            let fields: BTreeMap<String, FieldValue> = record
                .fields
                .iter()
                .map(|field| (field.name.clone(), field.value.clone()))
                .collect();
            match rows
                .iter_mut()
                .find(|row| row.tag == tag && row.legacy_id == record.source_id)
            {
                Some(row) => {
                    row.fields = fields;
                    loaded.push(LoadedId::new(record.source_id, row.id));
                }
                None => {
                    let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
                    rows.push(StoredRow {
                        id,
                        legacy_id: record.source_id,
                        tag: tag.clone(),
                        fields,
                    });
                    loaded.push(LoadedId::new(record.source_id, id));
                }
            }
        }

        *self
            .loaded_records
            .lock()
            .unwrap()
            .entry(schema.entity_type.clone())
            .or_default() += records.len();
        Ok(loaded)
    }
}

#[async_trait]
impl TargetInspector for MemoryTarget {
    async fn count(&self, schema: &EntitySchema) -> Result<i64, InspectorError> {
        Ok(self.scoped(schema)?.len() as i64)
    }

    async fn table_exists(&self, table: &str) -> Result<bool, InspectorError> {
        Ok(!self.dropped_tables.lock().unwrap().iter().any(|t| t == table))
    }

    async fn count_unmapped(&self, schema: &EntitySchema) -> Result<i64, InspectorError> {
        let tag = schema.target.discriminator.as_ref().map(|d| d.tag.clone());
        Ok(self
            .unmapped
            .lock()
            .unwrap()
            .get(&(schema.target.table.clone(), tag))
            .copied()
            .unwrap_or(0))
    }

    async fn find_orphans(
        &self,
        schema: &EntitySchema,
        fk: &ForeignKey,
        parent: &EntitySchema,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError> {
        let parent_ids: Vec<i64> = self.scoped(parent)?.iter().map(|row| row.id).collect();
        self.offending(schema, limit, |row| match row.get(&fk.target).as_i64() {
            Some(reference) => !parent_ids.contains(&reference),
            None => false,
        })
    }

    async fn find_required_violations(
        &self,
        schema: &EntitySchema,
        rule: &RequiredRule,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError> {
        self.offending(schema, limit, |row| {
            let value = row.get(rule.column());
            match rule {
                RequiredRule::NotNull(_) => value.is_null(),
                RequiredRule::NotBlank(_) => value.as_str().map(|s| s.trim().is_empty()).unwrap_or(true),
                RequiredRule::NonNegative(_) => value.as_f64().map(|v| v < 0.0).unwrap_or(true),
            }
        })
    }

    async fn find_invalid_coordinates(
        &self,
        schema: &EntitySchema,
        geo: &GeoColumns,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError> {
        self.offending(schema, limit, |row| {
            let latitude = row.get(&geo.latitude).as_f64();
            let longitude = row.get(&geo.longitude).as_f64();
            latitude.map(|v| !(-90.0..=90.0).contains(&v)).unwrap_or(false)
                || longitude.map(|v| !(-180.0..=180.0).contains(&v)).unwrap_or(false)
        })
    }

    async fn find_future_timestamps(
        &self,
        schema: &EntitySchema,
        column: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError> {
        self.offending(schema, limit, |row| {
            matches!(row.get(column), FieldValue::Timestamp(ts) if *ts > now)
        })
    }

    async fn sample_legacy_ids(
        &self,
        schema: &EntitySchema,
        size: i64,
    ) -> Result<Vec<i64>, InspectorError> {
        let mut ids: Vec<i64> = self.scoped(schema)?.iter().map(|row| row.legacy_id).collect();
        ids.sort_unstable();
        ids.truncate(size.max(0) as usize);
        Ok(ids)
    }

    async fn fetch_by_legacy_ids(
        &self,
        schema: &EntitySchema,
        legacy_ids: &[i64],
        columns: &[String],
    ) -> Result<Vec<TargetRow>, InspectorError> {
        Ok(self
            .scoped(schema)?
            .iter()
            .filter(|row| legacy_ids.contains(&row.legacy_id))
            .map(|row| Self::project(row, columns))
            .collect())
    }

    async fn fetch_children(
        &self,
        child: &EntitySchema,
        parent_field: &str,
        parent_id: i64,
        order: &[String],
        columns: &[String],
    ) -> Result<Vec<TargetRow>, InspectorError> {
        let mut children: Vec<StoredRow> = self
            .scoped(child)?
            .into_iter()
            .filter(|row| row.get(parent_field).as_i64() == Some(parent_id))
            .collect();
        children.sort_by(|a, b| {
            order
                .iter()
                .map(|column| compare_values(Some(a.get(column)), Some(b.get(column))))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(children.iter().map(|row| Self::project(row, columns)).collect())
    }

    async fn load_id_mappings(
        &self,
        schema: &EntitySchema,
        up_to_legacy_id: Option<i64>,
    ) -> Result<Vec<LoadedId>, InspectorError> {
        self.hydrations
            .lock()
            .unwrap()
            .entry(schema.entity_type.clone())
            .or_default()
            .push(up_to_legacy_id);
        Ok(self
            .scoped(schema)?
            .iter()
            .filter(|row| up_to_legacy_id.map(|bound| row.legacy_id <= bound).unwrap_or(true))
            .map(|row| LoadedId::new(row.legacy_id, row.id))
            .collect())
    }
}

/// Target writer that triggers a shutdown after a number of successful loads.
pub struct InterruptingLoader {
    pub inner: Arc<MemoryTarget>,
    pub entity_type: EntityType,
    pub after_calls: usize,
    pub shutdown: listings_migrator_pipeline::ShutdownHandle,
    calls: Mutex<usize>,
}

impl InterruptingLoader {
    pub fn new(
        inner: Arc<MemoryTarget>,
        entity_type: &str,
        after_calls: usize,
        shutdown: listings_migrator_pipeline::ShutdownHandle,
    ) -> Self {
        Self {
            inner,
            entity_type: et(entity_type),
            after_calls,
            shutdown,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl BatchLoader for InterruptingLoader {
    async fn load_batch(
        &self,
        schema: &EntitySchema,
        records: &[TransformedRecord],
    ) -> Result<Vec<LoadedId>, LoadError> {
        let loaded = self.inner.load_batch(schema, records).await?;
        if schema.entity_type == self.entity_type {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == self.after_calls {
                self.shutdown.trigger();
            }
        }
        Ok(loaded)
    }
}

/// Target writer that reports each source id back as the new id, the way a
/// document index keyed by legacy id does.
pub struct SourceIdLoader {
    pub inner: Arc<MemoryTarget>,
}

#[async_trait]
impl BatchLoader for SourceIdLoader {
    async fn load_batch(
        &self,
        schema: &EntitySchema,
        records: &[TransformedRecord],
    ) -> Result<Vec<LoadedId>, LoadError> {
        self.inner.load_batch(schema, records).await?;
        Ok(records
            .iter()
            .map(|record| LoadedId::new(record.source_id, record.source_id))
            .collect())
    }

    fn keeps_source_ids(&self) -> bool {
        true
    }
}

// ============================================================================
// Checkpoints
// ============================================================================

#[derive(Default)]
pub struct MemoryCheckpoints {
    stored: Mutex<HashMap<EntityType, BatchCheckpoint>>,
    saves: Mutex<usize>,
}

impl MemoryCheckpoints {
    pub fn get(&self, entity_type: &str) -> Option<BatchCheckpoint> {
        self.stored.lock().unwrap().get(&et(entity_type)).cloned()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl CheckpointRepository for MemoryCheckpoints {
    async fn get_checkpoint(
        &self,
        entity_type: &EntityType,
    ) -> Result<Option<BatchCheckpoint>, CheckpointRepositoryError> {
        Ok(self.stored.lock().unwrap().get(entity_type).cloned())
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &BatchCheckpoint,
    ) -> Result<(), CheckpointRepositoryError> {
        *self.saves.lock().unwrap() += 1;
        self.stored
            .lock()
            .unwrap()
            .insert(checkpoint.entity_type.clone(), checkpoint.clone());
        Ok(())
    }
}
