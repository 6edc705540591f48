//! Batch checkpoint types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::EntityType;

/// Lifecycle state of an entity type's migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CheckpointStatus::Pending),
            "in_progress" => Ok(CheckpointStatus::InProgress),
            "completed" => Ok(CheckpointStatus::Completed),
            "failed" => Ok(CheckpointStatus::Failed),
            other => Err(format!("unknown checkpoint status: {}", other)),
        }
    }
}

/// Last committed batch boundary for an entity type.
///
/// `last_committed_offset` is the number of source rows (in primary-key order)
/// already handled; the next batch starts there. `last_source_id` is the primary
/// key of the final row of that committed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCheckpoint {
    pub entity_type: EntityType,
    pub last_committed_offset: i64,
    pub last_source_id: Option<i64>,
    pub status: CheckpointStatus,
    pub updated_at: DateTime<Utc>,
}

impl BatchCheckpoint {
    pub fn pending(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            last_committed_offset: 0,
            last_source_id: None,
            status: CheckpointStatus::Pending,
            updated_at: Utc::now(),
        }
    }
}
