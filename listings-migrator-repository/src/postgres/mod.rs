//! PostgreSQL implementations of the store interfaces.

mod batch_loader;
mod checkpoint_repository;
mod source_reader;
mod sql;
mod target_inspector;

pub use batch_loader::PostgresBatchLoader;
pub use checkpoint_repository::PostgresCheckpointRepository;
pub use source_reader::PostgresSourceReader;
pub use target_inspector::PostgresTargetInspector;
