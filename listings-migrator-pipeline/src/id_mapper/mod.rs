//! Identifier mapper.
//!
//! Process-lifetime table of `(entity_type, old_id) -> new_id`. Entries are
//! append-only: a second `put` for the same key is a hard error, because it means
//! a batch was loaded twice without its checkpoint advancing in between.

use listings_migrator_shared::{EntityType, IdMapping, LoadedId};
use std::collections::HashMap;

use crate::errors::MapperError;

#[derive(Debug, Default)]
pub struct IdMapper {
    namespaces: HashMap<EntityType, HashMap<i64, i64>>,
}

impl IdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one mapping.
    ///
    /// # Errors
    ///
    /// `DuplicateMapping` if `(entity_type, old_id)` is already mapped.
    pub fn put(
        &mut self,
        entity_type: &EntityType,
        old_id: i64,
        new_id: i64,
    ) -> Result<(), MapperError> {
        let namespace = self.namespaces.entry(entity_type.clone()).or_default();
        if let Some(existing) = namespace.get(&old_id) {
            return Err(MapperError::DuplicateMapping {
                entity_type: entity_type.clone(),
                old_id,
                existing: *existing,
                attempted: new_id,
            });
        }
        namespace.insert(old_id, new_id);
        Ok(())
    }

    pub fn get(&self, entity_type: &EntityType, old_id: i64) -> Result<i64, MapperError> {
        self.lookup(entity_type, old_id)
            .ok_or_else(|| MapperError::NotFound {
                entity_type: entity_type.clone(),
                old_id,
            })
    }

    pub fn lookup(&self, entity_type: &EntityType, old_id: i64) -> Option<i64> {
        self.namespaces
            .get(entity_type)
            .and_then(|namespace| namespace.get(&old_id))
            .copied()
    }

    /// Record every mapping of one committed batch, or none of them.
    ///
    /// The whole batch is checked for duplicates (against existing entries and
    /// within itself) before anything is inserted.
    pub fn commit_batch(
        &mut self,
        entity_type: &EntityType,
        loaded: &[LoadedId],
    ) -> Result<(), MapperError> {
        let mut staged: HashMap<i64, i64> = HashMap::with_capacity(loaded.len());
        for id in loaded {
            let existing = self
                .lookup(entity_type, id.source_id)
                .or_else(|| staged.get(&id.source_id).copied());
            if let Some(existing) = existing {
                return Err(MapperError::DuplicateMapping {
                    entity_type: entity_type.clone(),
                    old_id: id.source_id,
                    existing,
                    attempted: id.new_id,
                });
            }
            staged.insert(id.source_id, id.new_id);
        }

        self.namespaces
            .entry(entity_type.clone())
            .or_default()
            .extend(staged);
        Ok(())
    }

    /// Rebuild mappings recovered from the target's correlation column.
    ///
    /// Pairs identical to an existing entry are accepted, so hydrating twice is
    /// harmless; a conflicting pair is still a `DuplicateMapping`. Returns the
    /// number of entries added.
    pub fn hydrate(
        &mut self,
        entity_type: &EntityType,
        loaded: &[LoadedId],
    ) -> Result<usize, MapperError> {
        let fresh: Vec<LoadedId> = loaded
            .iter()
            .filter(|id| self.lookup(entity_type, id.source_id) != Some(id.new_id))
            .copied()
            .collect();
        self.commit_batch(entity_type, &fresh)?;
        Ok(fresh.len())
    }

    pub fn len(&self, entity_type: &EntityType) -> usize {
        self.namespaces
            .get(entity_type)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(HashMap::is_empty)
    }

    /// All mappings of one entity type, ordered by old id.
    pub fn entries(&self, entity_type: &EntityType) -> Vec<IdMapping> {
        let mut entries: Vec<IdMapping> = self
            .namespaces
            .get(entity_type)
            .map(|namespace| {
                namespace
                    .iter()
                    .map(|(old_id, new_id)| IdMapping {
                        entity_type: entity_type.clone(),
                        old_id: *old_id,
                        new_id: *new_id,
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by_key(|entry| entry.old_id);
        entries
    }
}
