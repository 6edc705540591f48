//! Result types returned by target-store inspection queries.

use listings_migrator_shared::FieldValue;
use std::collections::BTreeMap;

/// Rows violating a validation predicate.
///
/// `count` is the total number of violating rows; `sample_ids` holds at most the
/// requested number of their primary keys, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffendingRows {
    pub count: i64,
    pub sample_ids: Vec<i64>,
}

impl OffendingRows {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A target row re-read for comparison, keyed by target column name.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRow {
    pub id: i64,
    pub legacy_id: i64,
    pub fields: BTreeMap<String, FieldValue>,
}

impl TargetRow {
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }
}
