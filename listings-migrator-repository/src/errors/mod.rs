//! Error types for the listings migrator repository.
//!
//! Connectivity failures are separated from query failures so callers can tell
//! an unreachable store from a statement the store rejected.

mod checkpoint_repository;
mod inspector;
mod load;
mod source;

pub use checkpoint_repository::CheckpointRepositoryError;
pub use inspector::InspectorError;
pub use load::LoadError;
pub use source::SourceError;

/// True for sqlx errors that mean the store could not be reached at all.
pub(crate) fn is_connectivity_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}
