//! # Listings Migrator Repository
//!
//! Traits and implementations for every store the migrator talks to: the
//! legacy source (read-only), the unified target (batched transactional writes
//! and read-only validation queries), the checkpoint table, and an optional
//! document index target.

pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod postgres;
pub mod types;

pub use errors::{CheckpointRepositoryError, InspectorError, LoadError, SourceError};
pub use interfaces::{BatchLoader, CheckpointRepository, SourceReader, TargetInspector};
pub use opensearch::OpenSearchBatchLoader;
pub use postgres::{
    PostgresBatchLoader, PostgresCheckpointRepository, PostgresSourceReader,
    PostgresTargetInspector,
};
pub use types::{OffendingRows, TargetRow};
