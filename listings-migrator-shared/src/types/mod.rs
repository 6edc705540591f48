pub mod checkpoint;
pub mod entity_type;
pub mod finding;
pub mod id_mapping;
pub mod record;
pub mod stats;
pub mod value;

pub use checkpoint::{BatchCheckpoint, CheckpointStatus};
pub use entity_type::EntityType;
pub use finding::{FindingLevel, ValidationFinding, ValidationReport};
pub use id_mapping::{IdMapping, LoadedId};
pub use record::{EntityRecord, TargetField, TransformedRecord};
pub use stats::{EntityRunStatus, EntityStats, MigrationSummary};
pub use value::{FieldValue, SemanticType};
