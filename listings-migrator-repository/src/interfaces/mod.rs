//! Store interfaces.
//!
//! Each store sits behind a trait so the pipeline can run against PostgreSQL,
//! a document index, or in-memory doubles in tests.

mod batch_loader;
mod checkpoint_repository;
mod source_reader;
mod target_inspector;

pub use batch_loader::BatchLoader;
pub use checkpoint_repository::CheckpointRepository;
pub use source_reader::SourceReader;
pub use target_inspector::TargetInspector;
