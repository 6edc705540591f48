//! # Listings Migrator
//!
//! Command-line front end for the listings migration pipeline: moves legacy
//! marketplace records into the unified listings schema (`migrate`) and checks
//! the result against the source (`validate`).
//!
//! ## Modules
//!
//! - [`cli`]: Argument and environment parsing
//! - [`config`]: Store connections and component wiring
//! - [`commands`]: Command runners and exit codes
//! - [`report`]: Summary and report rendering
//! - [`errors`]: Top-level error type

pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod report;

pub use config::Dependencies;
pub use errors::MigratorError;
