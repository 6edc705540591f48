//! Checks run before a migration starts.
//!
//! Every table a selected entity type reads or writes must exist, otherwise the
//! run is refused. Target rows the migrator did not write are only a warning:
//! they keep their ids and migrated rows are assigned new ones.

use listings_migrator_repository::{SourceReader, TargetInspector};
use listings_migrator_shared::{EntitySchema, EntityType, SchemaCatalog};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::errors::PreflightError;

/// Outcome of a passed preflight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    /// Distinct tables confirmed to exist, source and target together.
    pub tables_checked: usize,
    /// Entity types whose target scope already holds unmapped rows, with the count.
    pub unmapped: Vec<(EntityType, i64)>,
}

impl PreflightReport {
    pub fn has_conflicts(&self) -> bool {
        !self.unmapped.is_empty()
    }
}

pub struct Preflight {
    catalog: Arc<SchemaCatalog>,
    source: Arc<dyn SourceReader>,
    inspector: Arc<dyn TargetInspector>,
    check_target: bool,
}

impl Preflight {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        source: Arc<dyn SourceReader>,
        inspector: Arc<dyn TargetInspector>,
    ) -> Self {
        Self {
            catalog,
            source,
            inspector,
            check_target: true,
        }
    }

    /// Only check the source, for targets the inspector does not read.
    pub fn source_only(mut self) -> Self {
        self.check_target = false;
        self
    }

    /// Check the selected entity types; an empty selection means the whole catalog.
    ///
    /// # Returns
    ///
    /// * `Ok(PreflightReport)` - Every table exists; conflicts are listed, not fatal
    /// * `Err(PreflightError)` - A table is missing, a store cannot be queried,
    ///   or the selection names an unknown type
    #[instrument(skip(self))]
    pub async fn run(&self, only: &[EntityType]) -> Result<PreflightReport, PreflightError> {
        let schemas = self.selected(only)?;
        let mut report = PreflightReport::default();

        let source_tables = distinct(schemas.iter().flat_map(|schema| schema.source.tables.iter()));
        let mut missing = Vec::new();
        for table in &source_tables {
            if self.source.table_exists(table).await? {
                info!(table = %table, "Source table exists");
            } else {
                missing.push(table.clone());
            }
        }
        if !missing.is_empty() {
            return Err(PreflightError::MissingSourceTables(missing));
        }
        report.tables_checked += source_tables.len();

        if !self.check_target {
            return Ok(report);
        }

        let target_tables = distinct(schemas.iter().map(|schema| &schema.target.table));
        for table in &target_tables {
            if self.inspector.table_exists(table).await? {
                info!(table = %table, "Target table exists");
            } else {
                missing.push(table.clone());
            }
        }
        if !missing.is_empty() {
            return Err(PreflightError::MissingTargetTables(missing));
        }
        report.tables_checked += target_tables.len();

        for schema in &schemas {
            let unmapped = self.inspector.count_unmapped(schema).await?;
            if unmapped > 0 {
                warn!(
                    entity_type = %schema.entity_type,
                    table = %schema.target.table,
                    rows = unmapped,
                    "Target already holds rows the migrator did not write; migrated rows get new ids"
                );
                report.unmapped.push((schema.entity_type.clone(), unmapped));
            }
        }

        Ok(report)
    }

    fn selected(&self, only: &[EntityType]) -> Result<Vec<&EntitySchema>, PreflightError> {
        if only.is_empty() {
            return Ok(self.catalog.schemas().iter().collect());
        }
        let mut schemas = Vec::with_capacity(only.len());
        for entity_type in only {
            schemas.push(self.catalog.require(entity_type)?);
        }
        Ok(schemas)
    }
}

fn distinct<'a>(tables: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for table in tables {
        if !out.contains(table) {
            out.push(table.clone());
        }
    }
    out
}
