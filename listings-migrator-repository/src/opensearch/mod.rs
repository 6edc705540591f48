//! Document-index target.

mod batch_loader;

pub use batch_loader::OpenSearchBatchLoader;
