//! # Listings Migrator Shared
//!
//! Data structures shared across the listings migrator crates: the records that
//! flow through the pipeline, checkpoint and validation types, and the
//! per-entity schema definitions that drive transformation and validation.

pub mod schema;
pub mod types;

pub use schema::{
    listings_catalog, ChildComparison, Comparison, Discriminator, EntitySchema, EnumMapping,
    ForeignKey, GeoColumns, RequiredRule, SchemaCatalog, SchemaError, SourceTable, TargetTable,
};
pub use types::{
    BatchCheckpoint, CheckpointStatus, EntityRecord, EntityRunStatus, EntityStats, EntityType,
    FieldValue, FindingLevel, IdMapping, LoadedId, MigrationSummary, SemanticType, TargetField,
    TransformedRecord, ValidationFinding, ValidationReport,
};
