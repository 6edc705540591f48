//! Human-readable rendering of migration summaries and validation reports,
//! plus the task that turns progress events into log lines.

use listings_migrator_pipeline::MigrationEvent;
use listings_migrator_shared::{
    EntityRunStatus, FindingLevel, MigrationSummary, ValidationFinding, ValidationReport,
};
use serde_json::Value as JsonValue;
use std::fmt::Write;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Offending ids shown inline per finding; the JSON output carries all of them.
const INLINE_ID_LIMIT: usize = 10;

pub fn render_summary(summary: &MigrationSummary) -> String {
    let mut out = String::new();
    let title = if summary.dry_run {
        "Migration summary (dry run)"
    } else {
        "Migration summary"
    };
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(
        out,
        "{:<12} {:>10} {:>10} {:>10} {:>8} {:>12}  {}",
        "entity", "processed", "migrated", "failed", "batches", "offset", "status"
    );

    for stats in &summary.entities {
        let _ = writeln!(
            out,
            "{:<12} {:>10} {:>10} {:>10} {:>8} {:>12}  {}",
            stats.entity_type.as_str(),
            stats.processed,
            stats.migrated,
            stats.failed,
            stats.batches,
            format!("{}/{}", stats.end_offset, stats.total),
            status_label(&stats.status)
        );
    }

    let verdict = if summary.succeeded() {
        "COMPLETED"
    } else if !summary.failed() && summary.interrupted() {
        "INTERRUPTED"
    } else {
        "FAILED"
    };
    let _ = writeln!(
        out,
        "{:<12} {:>10} {:>10} {:>10}",
        "total",
        summary.total_processed(),
        summary.total_migrated(),
        summary.total_failed()
    );
    let _ = write!(
        out,
        "Result: {} in {:.1}s",
        verdict,
        summary.elapsed.as_secs_f64()
    );
    out
}

pub fn render_report(report: &ValidationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Validation report ({})",
        report.validated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let width = report
        .findings
        .iter()
        .map(|finding| finding.check_name.len())
        .max()
        .unwrap_or(0)
        .max("check".len());
    let _ = writeln!(out, "{:<width$}  {:<4}  {}", "check", "", "message", width = width);

    for finding in &report.findings {
        let _ = writeln!(
            out,
            "{:<width$}  {:<4}  {}",
            finding.check_name,
            level_label(finding.level),
            finding.message,
            width = width
        );
        if let Some(ids) = offending_ids(finding) {
            let _ = writeln!(out, "{:<width$}        ids: {}", "", ids, width = width);
        }
    }

    let failures = report.failures().count();
    let warnings = report.warnings().count();
    let verdict = if report.passed() { "PASSED" } else { "FAILED" };
    let _ = write!(
        out,
        "Result: {} ({} checks, {} failed, {} warnings)",
        verdict,
        report.findings.len(),
        failures,
        warnings
    );
    out
}

/// Log every progress event until the orchestrator drops its sender.
pub fn spawn_event_logger(mut events: mpsc::UnboundedReceiver<MigrationEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    })
}

fn log_event(event: &MigrationEvent) {
    match event {
        MigrationEvent::EntityStarted {
            entity_type,
            total,
            start_offset,
        } => info!(entity_type = %entity_type, total, start_offset, "Entity type started"),
        MigrationEvent::BatchCommitted {
            entity_type,
            offset,
            processed,
            migrated,
            failed,
        } => info!(
            entity_type = %entity_type,
            offset,
            processed,
            migrated,
            failed,
            "Batch committed"
        ),
        MigrationEvent::RecordFailed {
            entity_type,
            source_id,
            reason,
        } => warn!(entity_type = %entity_type, source_id, reason = %reason, "Record skipped"),
        MigrationEvent::EntityFinished(stats) => info!(
            entity_type = %stats.entity_type,
            processed = stats.processed,
            migrated = stats.migrated,
            failed = stats.failed,
            status = %status_label(&stats.status),
            "Entity type finished"
        ),
    }
}

fn status_label(status: &EntityRunStatus) -> String {
    match status {
        EntityRunStatus::Completed => "completed".to_string(),
        EntityRunStatus::Interrupted => "interrupted".to_string(),
        EntityRunStatus::Failed(reason) => format!("failed: {}", reason),
        EntityRunStatus::Aborted(reason) => format!("aborted: {}", reason),
        EntityRunStatus::Skipped(reason) => format!("skipped: {}", reason),
    }
}

fn level_label(level: FindingLevel) -> &'static str {
    match level {
        FindingLevel::Ok => "PASS",
        FindingLevel::Warning => "WARN",
        FindingLevel::Failure => "FAIL",
    }
}

fn offending_ids(finding: &ValidationFinding) -> Option<String> {
    let ids = finding.details.get("offending_ids")?.as_array()?;
    if ids.is_empty() {
        return None;
    }

    let mut shown: Vec<String> = ids
        .iter()
        .take(INLINE_ID_LIMIT)
        .map(|id| match id {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    if ids.len() > INLINE_ID_LIMIT {
        shown.push(format!("... (+{})", ids.len() - INLINE_ID_LIMIT));
    }
    Some(shown.join(", "))
}
