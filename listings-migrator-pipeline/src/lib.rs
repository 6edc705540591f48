//! # Listings Migrator Pipeline
//!
//! Moves records from the legacy source store into the unified target store
//! and verifies the result afterwards.
//!
//! ## Architecture
//!
//! Per entity type, batch by batch:
//!
//! 1. **Source reader**: fetches a page in primary-key order
//! 2. **Transformer**: maps each record onto the target schema, rewriting
//!    foreign keys through the identifier mapper
//! 3. **Loader**: upserts the batch in one transaction
//! 4. **Identifier mapper**: records the new ids once the batch committed
//! 5. **Checkpoint controller**: advances the resume offset
//!
//! The [`orchestrator`] runs entity types in dependency waves; the
//! [`validator`] is an independent, read-only pass over both stores. The
//! [`preflight`] checks run before a migration starts.

pub mod checkpoint;
pub mod errors;
pub mod id_mapper;
pub mod loader;
pub mod orchestrator;
pub mod preflight;
pub mod transformer;
pub mod validator;

pub use checkpoint::CheckpointController;
pub use errors::{
    CheckpointError, MapperError, OrchestratorError, PreflightError, TransformError,
    ValidationError,
};
pub use id_mapper::IdMapper;
pub use loader::MigrationLoader;
pub use orchestrator::{MigrationEvent, MigrationOptions, Orchestrator, ShutdownHandle};
pub use preflight::{Preflight, PreflightReport};
pub use transformer::SchemaTransformer;
pub use validator::{Validator, ValidatorConfig};
