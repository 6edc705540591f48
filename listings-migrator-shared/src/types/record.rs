//! Records flowing through the migration pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::{EntityType, FieldValue, SemanticType};

/// A row read from the source store.
///
/// Fields are keyed by source column name. Records are transient: created by the
/// source reader per row and discarded once transformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_type: EntityType,
    pub source_id: i64,
    pub fields: BTreeMap<String, FieldValue>,
}

impl EntityRecord {
    pub fn new(entity_type: EntityType, source_id: i64) -> Self {
        Self {
            entity_type,
            source_id,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// One typed column of a transformed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetField {
    pub name: String,
    pub ty: SemanticType,
    pub value: FieldValue,
}

/// A record re-expressed in target-schema columns, ready for loading.
///
/// `fields` is ordered identically for every record of the same entity type, which
/// lets loaders build multi-row statements from the first record's column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedRecord {
    pub entity_type: EntityType,
    pub source_id: i64,
    pub target_table: String,
    pub secondary_id: Option<Uuid>,
    pub fields: Vec<TargetField>,
}

impl TransformedRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }
}
