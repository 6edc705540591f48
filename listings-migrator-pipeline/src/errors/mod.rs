//! Error types for the migration pipeline.

mod checkpoint;
mod mapper;
mod orchestrator;
mod preflight;
mod transform;
mod validation;

pub use checkpoint::CheckpointError;
pub use mapper::MapperError;
pub use orchestrator::OrchestratorError;
pub use preflight::PreflightError;
pub use transform::TransformError;
pub use validation::ValidationError;
