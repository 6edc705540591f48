//! Post-migration validator.
//!
//! A read-only pass over both stores producing one [`ValidationFinding`] per
//! check. Findings never abort validation: a check whose query fails is itself
//! reported as a failure and the remaining checks still run.
//!
//! Checks, per entity type:
//!
//! | check                                  | fails when                               |
//! |----------------------------------------|------------------------------------------|
//! | `row_count_parity:{type}`              | source and target counts differ          |
//! | `orphans:{type}.{fk}`                  | a non-null reference has no parent row   |
//! | `required:{type}.{column}:{rule}`      | a completeness rule is violated          |
//! | `coordinates:{type}`                   | latitude or longitude is out of range    |
//! | `future_timestamps:{type}.{column}`    | a timestamp is after validation time     |
//! | `sampled_equivalence:{type}`           | more sampled rows differ than allowed    |

mod checks;

use chrono::Utc;
use listings_migrator_repository::{SourceReader, TargetInspector};
use listings_migrator_shared::{
    EntitySchema, EntityType, SchemaCatalog, ValidationFinding, ValidationReport,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::errors::ValidationError;
use crate::transformer::SchemaTransformer;

/// Configuration for a validation run.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Rows drawn per entity type for sampled equivalence.
    pub sample_size: i64,
    /// Absolute tolerance for numeric comparisons.
    pub numeric_tolerance: f64,
    /// Mismatched sampled rows tolerated as a warning; more is a failure.
    pub max_sample_mismatches: u64,
    /// Offending ids listed per finding.
    pub offending_id_limit: i64,
    /// Entity types to validate; empty selects the whole catalog.
    pub only: Vec<EntityType>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            sample_size: 100,
            numeric_tolerance: 0.01,
            max_sample_mismatches: 0,
            offending_id_limit: 20,
            only: Vec::new(),
        }
    }
}

pub struct Validator {
    catalog: Arc<SchemaCatalog>,
    source: Arc<dyn SourceReader>,
    inspector: Arc<dyn TargetInspector>,
    transformer: SchemaTransformer,
    config: ValidatorConfig,
}

impl Validator {
    /// Creates a new validator.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Entity schemas declaring what to check
    /// * `source` - Legacy store reader
    /// * `inspector` - Target store reader
    /// * `config` - Sampling and tolerance settings
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        source: Arc<dyn SourceReader>,
        inspector: Arc<dyn TargetInspector>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            catalog,
            source,
            inspector,
            transformer: SchemaTransformer::new(),
            config,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Runs every check for every selected entity type.
    ///
    /// # Returns
    ///
    /// * `Ok(ValidationReport)` - All findings; see [`ValidationReport::passed`]
    /// * `Err(ValidationError)` - The entity selection names an unknown type
    #[instrument(skip(self))]
    pub async fn validate(&self) -> Result<ValidationReport, ValidationError> {
        for entity_type in &self.config.only {
            self.catalog.require(entity_type)?;
        }

        let mut report = ValidationReport::new(Utc::now());
        for schema in self.catalog.schemas() {
            if !self.config.only.is_empty() && !self.config.only.contains(&schema.entity_type) {
                continue;
            }
            self.validate_entity(schema, &mut report).await;
        }

        let failures = report.failures().count();
        let warnings = report.warnings().count();
        if failures > 0 {
            warn!(
                checks = report.findings.len(),
                failures, warnings, "Validation failed"
            );
        } else {
            info!(
                checks = report.findings.len(),
                warnings, "Validation passed"
            );
        }
        Ok(report)
    }

    async fn validate_entity(&self, schema: &EntitySchema, report: &mut ValidationReport) {
        let entity_type = &schema.entity_type;

        let name = format!("row_count_parity:{}", entity_type);
        report.push(settle(&name, self.check_row_count(&name, schema).await));

        for fk in &schema.foreign_keys {
            let name = format!("orphans:{}.{}", entity_type, fk.target);
            report.push(settle(&name, self.check_orphans(&name, schema, fk).await));
        }

        for rule in &schema.required {
            let name = format!("required:{}.{}:{}", entity_type, rule.column(), rule.name());
            report.push(settle(&name, self.check_required(&name, schema, rule).await));
        }

        if let Some(geo) = &schema.geo {
            let name = format!("coordinates:{}", entity_type);
            report.push(settle(&name, self.check_coordinates(&name, schema, geo).await));
        }

        for column in &schema.timestamps {
            let name = format!("future_timestamps:{}.{}", entity_type, column);
            let now = report.validated_at;
            report.push(settle(
                &name,
                self.check_future_timestamps(&name, schema, column, now).await,
            ));
        }

        if !schema.comparisons.is_empty() || !schema.children.is_empty() {
            let name = format!("sampled_equivalence:{}", entity_type);
            report.push(settle(&name, self.check_sampled_equivalence(&name, schema).await));
        }
    }
}

/// Turns a check that could not run into a failed finding.
fn settle(name: &str, result: Result<ValidationFinding, ValidationError>) -> ValidationFinding {
    match result {
        Ok(finding) => finding,
        Err(e) => {
            warn!(check = name, error = %e, "Validation check could not run");
            ValidationFinding::fail(name, format!("check could not run: {}", e))
                .detail("error", e.to_string())
        }
    }
}
