//! Identifier mapping entries.

use serde::{Deserialize, Serialize};

use crate::types::EntityType;

/// Correspondence between a source-local primary key and the target primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdMapping {
    pub entity_type: EntityType,
    pub old_id: i64,
    pub new_id: i64,
}

/// Identifier pair returned by a batch loader for one persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadedId {
    pub source_id: i64,
    pub new_id: i64,
}

impl LoadedId {
    pub fn new(source_id: i64, new_id: i64) -> Self {
        Self { source_id, new_id }
    }

    pub fn into_mapping(self, entity_type: &EntityType) -> IdMapping {
        IdMapping {
            entity_type: entity_type.clone(),
            old_id: self.source_id,
            new_id: self.new_id,
        }
    }
}
