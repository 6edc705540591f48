//! The `migrate` and `validate` commands.
//!
//! Each command returns the process exit code it wants; errors that stop a
//! command before it produced a summary are left to the caller.

use listings_migrator_pipeline::{MigrationOptions, ValidatorConfig};
use listings_migrator_shared::{MigrationSummary, ValidationReport};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::cli::{MigrateArgs, ValidateArgs};
use crate::config::{Dependencies, RetryPolicy};
use crate::errors::MigratorError;
use crate::report::{render_report, render_summary, spawn_event_logger};

pub const EXIT_SUCCESS: u8 = 0;
/// Some entity type or validation check failed.
pub const EXIT_FAILURE: u8 = 1;
/// The command could not run at all.
pub const EXIT_FATAL: u8 = 2;
/// Stopped by Ctrl-C after in-flight batches committed.
pub const EXIT_INTERRUPTED: u8 = 130;

pub async fn migrate(args: MigrateArgs) -> Result<u8, MigratorError> {
    let deps = Dependencies::connect(&args.database, RetryPolicy::from_env()).await?;
    deps.prepare_checkpoints(args.dry_run).await?;
    let loader = deps.batch_loader(args.target, &args.opensearch).await?;
    let only = args.entity_types();
    deps.preflight(args.target, &only).await?;

    let options = MigrationOptions {
        batch_size: args.batch_size,
        dry_run: args.dry_run,
        resume_from: args.resume_from,
        strict: args.strict,
        pace: args.pace(),
        only,
    };
    info!(
        batch_size = options.batch_size,
        dry_run = options.dry_run,
        resume_from = ?options.resume_from,
        strict = options.strict,
        target = ?args.target,
        "Starting migration"
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let logger = spawn_event_logger(rx);
    let orchestrator = deps.orchestrator(loader, options).with_events(tx);

    let result = orchestrator.run_until_interrupted().await;
    // Closes the event channel so the logger drains and exits.
    drop(orchestrator);
    if let Err(e) = logger.await {
        warn!(error = %e, "Event logger stopped unexpectedly");
    }

    let summary = result?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", render_summary(&summary));
    }

    let code = summary_exit_code(&summary);
    if code == EXIT_SUCCESS {
        info!(migrated = summary.total_migrated(), "Migration completed");
    } else {
        error!(
            failed = summary.total_failed(),
            interrupted = summary.interrupted(),
            "Migration did not complete"
        );
    }
    Ok(code)
}

pub async fn validate(args: ValidateArgs) -> Result<u8, MigratorError> {
    let deps = Dependencies::connect(&args.database, RetryPolicy::from_env()).await?;

    let config = ValidatorConfig {
        sample_size: args.sample_size,
        numeric_tolerance: args.tolerance,
        max_sample_mismatches: args.max_mismatches,
        only: args.entity_types(),
        ..ValidatorConfig::default()
    };
    let report = deps.validator(config).validate().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_report(&report));
    }

    Ok(report_exit_code(&report))
}

/// A fatal entity failure wins over an interrupt; otherwise an interrupted run
/// reports 130 so the operator knows a rerun resumes it.
pub fn summary_exit_code(summary: &MigrationSummary) -> u8 {
    if summary.succeeded() {
        EXIT_SUCCESS
    } else if summary.failed() {
        EXIT_FAILURE
    } else if summary.interrupted() {
        EXIT_INTERRUPTED
    } else {
        EXIT_FAILURE
    }
}

pub fn report_exit_code(report: &ValidationReport) -> u8 {
    if report.passed() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}
