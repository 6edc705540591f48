//! Migration run statistics.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::EntityType;

/// Final state of one entity type within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum EntityRunStatus {
    Completed,
    /// Stopped by an operator interrupt after the in-flight batch settled.
    Interrupted,
    Failed(String),
    /// Stopped after its in-flight batch because another entity type failed fatally.
    Aborted(String),
    /// Not started because a dependency did not complete or the run was aborted.
    Skipped(String),
}

/// Per entity type counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStats {
    pub entity_type: EntityType,
    /// Source active-record count observed when the type started.
    pub total: u64,
    pub processed: u64,
    pub migrated: u64,
    pub failed: u64,
    pub batches: u64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub status: EntityRunStatus,
}

impl EntityStats {
    pub fn new(entity_type: EntityType, start_offset: i64) -> Self {
        Self {
            entity_type,
            total: 0,
            processed: 0,
            migrated: 0,
            failed: 0,
            batches: 0,
            start_offset,
            end_offset: start_offset,
            status: EntityRunStatus::Completed,
        }
    }

    pub fn skipped(entity_type: EntityType, reason: impl Into<String>) -> Self {
        let mut stats = Self::new(entity_type, 0);
        stats.status = EntityRunStatus::Skipped(reason.into());
        stats
    }
}

/// Summary of a whole migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub entities: Vec<EntityStats>,
    pub dry_run: bool,
    pub elapsed: Duration,
}

impl MigrationSummary {
    /// True when every entity type ran to completion.
    pub fn succeeded(&self) -> bool {
        self.entities
            .iter()
            .all(|stats| stats.status == EntityRunStatus::Completed)
    }

    /// True when some entity type hit an error that ended the run.
    pub fn failed(&self) -> bool {
        self.entities
            .iter()
            .any(|stats| matches!(stats.status, EntityRunStatus::Failed(_)))
    }

    pub fn interrupted(&self) -> bool {
        self.entities
            .iter()
            .any(|stats| stats.status == EntityRunStatus::Interrupted)
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntityStats> {
        self.entities
            .iter()
            .find(|stats| stats.entity_type.as_str() == entity_type)
    }

    pub fn total_processed(&self) -> u64 {
        self.entities.iter().map(|stats| stats.processed).sum()
    }

    pub fn total_migrated(&self) -> u64 {
        self.entities.iter().map(|stats| stats.migrated).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.entities.iter().map(|stats| stats.failed).sum()
    }
}
