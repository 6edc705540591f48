//! Per-entity schema definitions.
//!
//! An [`EntitySchema`] is the static mapping table for one entity type: which
//! source relation it is read from, how each column is renamed, remapped or
//! defaulted, which columns are foreign keys into other entity types, and which
//! target invariants the validator checks afterwards.

mod catalog;
mod entity_schema;
mod listings;

pub use catalog::{SchemaCatalog, SchemaError};
pub use entity_schema::{
    ChildComparison, Coalesce, Comparison, DefaultValue, Discriminator, EntitySchema, EnumMapping,
    FieldMapping, ForeignKey, GeoColumns, JsonAggregate, RequiredRule, SourceTable, TargetTable,
};
pub use listings::listings_catalog;
