//! Validation findings and the aggregated report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Outcome class of a single validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingLevel {
    Ok,
    /// Passed, but with mismatches under the configured tolerance threshold.
    Warning,
    /// Hard failure; fails the whole validation run.
    Failure,
}

/// Result of one validation check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub check_name: String,
    pub passed: bool,
    pub level: FindingLevel,
    pub message: String,
    pub details: Map<String, JsonValue>,
}

impl ValidationFinding {
    pub fn pass(check_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(check_name, FindingLevel::Ok, message)
    }

    pub fn warning(check_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(check_name, FindingLevel::Warning, message)
    }

    pub fn fail(check_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(check_name, FindingLevel::Failure, message)
    }

    fn with_level(check_name: impl Into<String>, level: FindingLevel, message: impl Into<String>) -> Self {
        Self {
            check_name: check_name.into(),
            passed: level != FindingLevel::Failure,
            level,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Attach a structured detail entry.
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// All findings of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Vec<ValidationFinding>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn new(validated_at: DateTime<Utc>) -> Self {
        Self {
            findings: Vec::new(),
            validated_at,
        }
    }

    pub fn push(&mut self, finding: ValidationFinding) {
        self.findings.push(finding);
    }

    /// The run passes only when no finding is a hard failure.
    pub fn passed(&self) -> bool {
        self.findings.iter().all(|finding| finding.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|finding| !finding.passed)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings
            .iter()
            .filter(|finding| finding.level == FindingLevel::Warning)
    }

    pub fn find(&self, check_name: &str) -> Option<&ValidationFinding> {
        self.findings
            .iter()
            .find(|finding| finding.check_name == check_name)
    }
}
