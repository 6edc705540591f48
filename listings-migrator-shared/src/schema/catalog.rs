use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::schema::EntitySchema;
use crate::types::EntityType;

/// Errors detected while assembling a schema catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Entity type declared twice: {0}")]
    DuplicateEntityType(EntityType),

    #[error("Entity type {entity_type} references undeclared entity type {references}")]
    UnknownReference {
        entity_type: EntityType,
        references: EntityType,
    },

    #[error("Dependency cycle between entity types: {0:?}")]
    Cycle(Vec<EntityType>),

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(EntityType),
}

/// Validated set of entity schemas making up one migration plan.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    schemas: Vec<EntitySchema>,
}

impl SchemaCatalog {
    /// Builds a catalog, rejecting duplicate types, dangling references and cycles.
    pub fn new(schemas: Vec<EntitySchema>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for schema in &schemas {
            if !seen.insert(schema.entity_type.clone()) {
                return Err(SchemaError::DuplicateEntityType(schema.entity_type.clone()));
            }
        }
        for schema in &schemas {
            for parent in schema.depends_on() {
                if !seen.contains(&parent) {
                    return Err(SchemaError::UnknownReference {
                        entity_type: schema.entity_type.clone(),
                        references: parent,
                    });
                }
            }
        }

        let catalog = Self { schemas };
        catalog.compute_waves()?;
        Ok(catalog)
    }

    pub fn get(&self, entity_type: &EntityType) -> Option<&EntitySchema> {
        self.schemas
            .iter()
            .find(|schema| &schema.entity_type == entity_type)
    }

    pub fn require(&self, entity_type: &EntityType) -> Result<&EntitySchema, SchemaError> {
        self.get(entity_type)
            .ok_or_else(|| SchemaError::UnknownEntityType(entity_type.clone()))
    }

    pub fn schemas(&self) -> &[EntitySchema] {
        &self.schemas
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.schemas.iter().map(|schema| &schema.entity_type)
    }

    /// Groups entity types into dependency waves.
    ///
    /// Every type in wave `n` depends only on types in waves `< n`, so the types
    /// within one wave can be migrated concurrently. Declaration order is kept
    /// inside a wave.
    pub fn dependency_waves(&self) -> Vec<Vec<&EntitySchema>> {
        // Cycles are rejected in `new`, so this cannot fail here.
        self.compute_waves().unwrap_or_default()
    }

    fn compute_waves(&self) -> Result<Vec<Vec<&EntitySchema>>, SchemaError> {
        let mut level: HashMap<&EntityType, usize> = HashMap::new();
        let mut remaining: Vec<&EntitySchema> = self.schemas.iter().collect();
        let mut waves: Vec<Vec<&EntitySchema>> = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&EntitySchema>, Vec<&EntitySchema>) =
                remaining.into_iter().partition(|schema| {
                    schema
                        .depends_on()
                        .iter()
                        .all(|parent| level.contains_key(parent))
                });

            if ready.is_empty() {
                return Err(SchemaError::Cycle(
                    blocked.iter().map(|s| s.entity_type.clone()).collect(),
                ));
            }

            let wave_index = waves.len();
            for schema in &ready {
                level.insert(&schema.entity_type, wave_index);
            }
            waves.push(ready);
            remaining = blocked;
        }

        Ok(waves)
    }
}
