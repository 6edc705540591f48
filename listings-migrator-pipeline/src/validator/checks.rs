//! Individual validation checks.

use chrono::{DateTime, Utc};
use listings_migrator_repository::{OffendingRows, TargetRow};
use listings_migrator_shared::{
    ChildComparison, Comparison, EntityRecord, EntitySchema, FieldValue, ForeignKey, GeoColumns,
    RequiredRule, ValidationFinding,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

use super::Validator;
use crate::errors::ValidationError;

/// One field that differs between a source row and its migrated counterpart.
#[derive(Debug, Clone, PartialEq)]
struct Mismatch {
    legacy_id: i64,
    field: String,
    expected: JsonValue,
    actual: JsonValue,
}

impl Mismatch {
    fn new(legacy_id: i64, field: impl Into<String>, expected: JsonValue, actual: JsonValue) -> Self {
        Self {
            legacy_id,
            field: field.into(),
            expected,
            actual,
        }
    }

    fn to_json(&self) -> JsonValue {
        json!({
            "legacy_id": self.legacy_id,
            "field": self.field,
            "expected": self.expected,
            "actual": self.actual,
        })
    }
}

impl Validator {
    pub(super) async fn check_row_count(
        &self,
        name: &str,
        schema: &EntitySchema,
    ) -> Result<ValidationFinding, ValidationError> {
        let source = self.source.count(schema).await?;
        let target = self.inspector.count(schema).await?;
        let delta = source - target;

        let finding = if delta == 0 {
            ValidationFinding::pass(name, format!("{} rows in source and target", source))
        } else {
            ValidationFinding::fail(
                name,
                format!("source has {} rows, target has {} (delta {})", source, target, delta),
            )
        };
        Ok(finding
            .detail("source", source)
            .detail("target", target)
            .detail("delta", delta))
    }

    pub(super) async fn check_orphans(
        &self,
        name: &str,
        schema: &EntitySchema,
        fk: &ForeignKey,
    ) -> Result<ValidationFinding, ValidationError> {
        let parent = self.catalog.require(&fk.references)?;
        let rows = self
            .inspector
            .find_orphans(schema, fk, parent, self.config.offending_id_limit)
            .await?;
        Ok(offending_finding(
            name,
            rows,
            &format!("{} references a missing {}", fk.target, fk.references),
        ))
    }

    pub(super) async fn check_required(
        &self,
        name: &str,
        schema: &EntitySchema,
        rule: &RequiredRule,
    ) -> Result<ValidationFinding, ValidationError> {
        let rows = self
            .inspector
            .find_required_violations(schema, rule, self.config.offending_id_limit)
            .await?;
        Ok(offending_finding(
            name,
            rows,
            &format!("{} violates {}", rule.column(), rule.name()),
        ))
    }

    pub(super) async fn check_coordinates(
        &self,
        name: &str,
        schema: &EntitySchema,
        geo: &GeoColumns,
    ) -> Result<ValidationFinding, ValidationError> {
        let rows = self
            .inspector
            .find_invalid_coordinates(schema, geo, self.config.offending_id_limit)
            .await?;
        Ok(offending_finding(name, rows, "coordinates out of range"))
    }

    pub(super) async fn check_future_timestamps(
        &self,
        name: &str,
        schema: &EntitySchema,
        column: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidationFinding, ValidationError> {
        let rows = self
            .inspector
            .find_future_timestamps(schema, column, now, self.config.offending_id_limit)
            .await?;
        Ok(offending_finding(
            name,
            rows,
            &format!("{} is later than {}", column, now.to_rfc3339()),
        ))
    }

    /// Re-reads a random sample from both stores and compares it in target terms.
    pub(super) async fn check_sampled_equivalence(
        &self,
        name: &str,
        schema: &EntitySchema,
    ) -> Result<ValidationFinding, ValidationError> {
        let ids = self
            .inspector
            .sample_legacy_ids(schema, self.config.sample_size)
            .await?;
        if ids.is_empty() {
            return Ok(ValidationFinding::pass(name, "no migrated rows to sample").detail("sampled", 0));
        }

        let columns: Vec<String> = schema
            .comparisons
            .iter()
            .map(|comparison| comparison.column().to_string())
            .collect();
        let targets: HashMap<i64, TargetRow> = self
            .inspector
            .fetch_by_legacy_ids(schema, &ids, &columns)
            .await?
            .into_iter()
            .map(|row| (row.legacy_id, row))
            .collect();
        let sources: HashMap<i64, EntityRecord> = self
            .source
            .fetch_by_ids(schema, &ids)
            .await?
            .into_iter()
            .map(|record| (record.source_id, record))
            .collect();

        let mut mismatches: Vec<Mismatch> = Vec::new();
        let mut mismatched_rows = 0u64;
        for id in &ids {
            let row_mismatches = match (sources.get(id), targets.get(id)) {
                (Some(source), Some(target)) => self.compare_row(schema, source, target).await?,
                (None, _) => vec![Mismatch::new(*id, "row", json!("present in source"), json!("missing in source"))],
                (_, None) => vec![Mismatch::new(*id, "row", json!("present in target"), json!("missing in target"))],
            };
            if !row_mismatches.is_empty() {
                mismatched_rows += 1;
                mismatches.extend(row_mismatches);
            }
        }

        let sampled = ids.len() as u64;
        let consistency = (sampled - mismatched_rows) as f64 / sampled as f64 * 100.0;
        let message = format!(
            "{} of {} sampled rows match ({:.1}% consistent)",
            sampled - mismatched_rows,
            sampled,
            consistency
        );

        let finding = if mismatched_rows == 0 {
            ValidationFinding::pass(name, message)
        } else if mismatched_rows <= self.config.max_sample_mismatches {
            ValidationFinding::warning(name, message)
        } else {
            ValidationFinding::fail(name, message)
        };
        Ok(finding
            .detail("sampled", sampled)
            .detail("mismatched_rows", mismatched_rows)
            .detail("consistency_pct", consistency)
            .detail(
                "mismatches",
                mismatches.iter().map(Mismatch::to_json).collect::<Vec<_>>(),
            ))
    }

    async fn compare_row(
        &self,
        schema: &EntitySchema,
        source: &EntityRecord,
        target: &TargetRow,
    ) -> Result<Vec<Mismatch>, ValidationError> {
        let legacy_id = source.source_id;
        let projected = match self.transformer.project(source, schema) {
            Ok(projected) => projected,
            Err(e) => {
                return Ok(vec![Mismatch::new(
                    legacy_id,
                    "row",
                    json!(e.to_string()),
                    json!("migrated"),
                )]);
            }
        };

        let mut mismatches = Vec::new();
        for comparison in &schema.comparisons {
            let column = comparison.column();
            let Some(expected) = projected.get(column) else {
                continue;
            };
            let actual = target.get(column).unwrap_or(&FieldValue::Null);
            let matches = match comparison {
                Comparison::Exact(_) => expected == actual,
                Comparison::Numeric(_) => numeric_match(expected, actual, self.config.numeric_tolerance),
            };
            if !matches {
                mismatches.push(Mismatch::new(legacy_id, column, expected.to_json(), actual.to_json()));
            }
        }

        for children in &schema.children {
            mismatches.extend(self.compare_children(children, legacy_id, target.id).await?);
        }
        Ok(mismatches)
    }

    /// Compares an ordered dependent list, position by position.
    async fn compare_children(
        &self,
        comparison: &ChildComparison,
        legacy_id: i64,
        target_id: i64,
    ) -> Result<Vec<Mismatch>, ValidationError> {
        let child = self.catalog.require(&comparison.child)?;
        let source_children = self
            .source
            .fetch_children(child, &comparison.source_parent_field, legacy_id, &comparison.source_order)
            .await?;
        let target_children = self
            .inspector
            .fetch_children(
                child,
                &comparison.target_parent_field,
                target_id,
                &comparison.target_order,
                &comparison.fields,
            )
            .await?;

        let mut mismatches = Vec::new();
        if source_children.len() != target_children.len() {
            mismatches.push(Mismatch::new(
                legacy_id,
                format!("{}.count", comparison.child),
                json!(source_children.len()),
                json!(target_children.len()),
            ));
        }

        for (position, (source, target)) in source_children.iter().zip(&target_children).enumerate() {
            let projected = match self.transformer.project(source, child) {
                Ok(projected) => projected,
                Err(e) => {
                    mismatches.push(Mismatch::new(
                        legacy_id,
                        format!("{}[{}]", comparison.child, position),
                        json!(e.to_string()),
                        json!("migrated"),
                    ));
                    continue;
                }
            };
            for field in &comparison.fields {
                let expected = projected.get(field).unwrap_or(&FieldValue::Null);
                let actual = target.get(field).unwrap_or(&FieldValue::Null);
                if expected != actual {
                    mismatches.push(Mismatch::new(
                        legacy_id,
                        format!("{}[{}].{}", comparison.child, position, field),
                        expected.to_json(),
                        actual.to_json(),
                    ));
                }
            }
        }
        Ok(mismatches)
    }
}

fn offending_finding(name: &str, rows: OffendingRows, violation: &str) -> ValidationFinding {
    let finding = if rows.is_empty() {
        ValidationFinding::pass(name, "no violations")
    } else {
        ValidationFinding::fail(name, format!("{} rows: {}", rows.count, violation))
    };
    finding
        .detail("count", rows.count)
        .detail("offending_ids", rows.sample_ids)
}

/// Both null, or both numeric and within `tolerance` of each other.
fn numeric_match(expected: &FieldValue, actual: &FieldValue, tolerance: f64) -> bool {
    match (expected.as_f64(), actual.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() <= tolerance,
        _ => expected.is_null() && actual.is_null(),
    }
}
