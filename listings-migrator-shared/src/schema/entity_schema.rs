use serde::Serialize;

use crate::types::{EntityType, FieldValue, SemanticType};

/// Where the rows of an entity type are read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTable {
    /// SQL `FROM` fragment: a quoted table name or an aliased subquery.
    pub relation: String,
    pub primary_key: String,
    /// Optional predicate selecting the active records to migrate.
    pub filter: Option<String>,
    /// Physical tables the relation reads, checked for existence before a run.
    pub tables: Vec<String>,
}

impl SourceTable {
    pub fn table(name: &str, primary_key: &str) -> Self {
        Self {
            relation: format!("\"{}\"", name.replace('"', "\"\"")),
            primary_key: primary_key.to_string(),
            filter: None,
            tables: vec![name.to_string()],
        }
    }

    /// A derived relation, e.g. a join that pulls an owner column from a parent table.
    ///
    /// Name the tables it reads with [`reading`](Self::reading).
    pub fn query(sql: &str, primary_key: &str) -> Self {
        Self {
            relation: format!("({}) AS src", sql),
            primary_key: primary_key.to_string(),
            filter: None,
            tables: Vec::new(),
        }
    }

    pub fn reading(mut self, tables: &[&str]) -> Self {
        self.tables = tables.iter().map(|table| table.to_string()).collect();
        self
    }

    pub fn with_filter(mut self, predicate: &str) -> Self {
        self.filter = Some(predicate.to_string());
        self
    }
}

/// Source-type tag written on every row of a shared target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discriminator {
    pub column: String,
    pub tag: String,
}

/// Target table plus the columns the engine synthesizes itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetTable {
    pub table: String,
    pub primary_key: String,
    /// Column retaining the source primary key; the upsert conflict key.
    pub correlation_column: String,
    pub discriminator: Option<Discriminator>,
    pub secondary_id_column: Option<String>,
}

impl TargetTable {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            primary_key: "id".to_string(),
            correlation_column: "legacy_id".to_string(),
            discriminator: None,
            secondary_id_column: None,
        }
    }

    pub fn discriminated_by(mut self, column: &str, tag: &str) -> Self {
        self.discriminator = Some(Discriminator {
            column: column.to_string(),
            tag: tag.to_string(),
        });
        self
    }

    pub fn with_secondary_id(mut self, column: &str) -> Self {
        self.secondary_id_column = Some(column.to_string());
        self
    }

    /// Columns forming the upsert conflict key.
    pub fn conflict_columns(&self) -> Vec<&str> {
        let mut columns = Vec::with_capacity(2);
        if let Some(discriminator) = &self.discriminator {
            columns.push(discriminator.column.as_str());
        }
        columns.push(self.correlation_column.as_str());
        columns
    }
}

/// Plain rename/retype of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
    pub ty: SemanticType,
    pub required: bool,
    /// Substituted when the source value is null.
    pub fallback: Option<FieldValue>,
    /// A null source timestamp becomes the time the transformer was created.
    pub now_when_null: bool,
}

/// First non-null of several source columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coalesce {
    pub sources: Vec<String>,
    pub target: String,
    pub ty: SemanticType,
}

/// Vocabulary translation for an enumerated text column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumMapping {
    pub source: String,
    pub target: String,
    pub rules: Vec<(String, String)>,
    pub fallback: Option<String>,
    /// Several source values collapse onto one target value; the distinction is lost.
    pub lossy: bool,
}

impl EnumMapping {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            rules: Vec::new(),
            fallback: None,
            lossy: false,
        }
    }

    pub fn map(mut self, from: &str, to: &str) -> Self {
        self.rules.push((from.to_string(), to.to_string()));
        self
    }

    pub fn fallback(mut self, value: &str) -> Self {
        self.fallback = Some(value.to_string());
        self
    }

    pub fn lossy(mut self) -> Self {
        self.lossy = true;
        self
    }

    pub fn resolve(&self, value: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(from, _)| from == value)
            .map(|(_, to)| to.as_str())
    }
}

/// Target column with no source equivalent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultValue {
    pub target: String,
    pub ty: SemanticType,
    pub value: FieldValue,
}

/// Folds several source columns into one JSON object column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonAggregate {
    pub target: String,
    /// `(source column, semantic type, JSON key)`
    pub entries: Vec<(String, SemanticType, String)>,
}

/// Column referencing another entity type by its source id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKey {
    pub source: String,
    pub target: String,
    pub references: EntityType,
    pub required: bool,
}

/// Target-side completeness rule checked by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RequiredRule {
    NotNull(String),
    /// Not null and not an empty or whitespace-only string.
    NotBlank(String),
    /// Not null and `>= 0`.
    NonNegative(String),
}

impl RequiredRule {
    pub fn column(&self) -> &str {
        match self {
            RequiredRule::NotNull(column)
            | RequiredRule::NotBlank(column)
            | RequiredRule::NonNegative(column) => column,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RequiredRule::NotNull(_) => "not_null",
            RequiredRule::NotBlank(_) => "not_blank",
            RequiredRule::NonNegative(_) => "non_negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoColumns {
    pub latitude: String,
    pub longitude: String,
}

/// Target column compared between source and target during sampled equivalence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Comparison {
    Exact(String),
    /// Numeric equality within the validator's tolerance.
    Numeric(String),
}

impl Comparison {
    pub fn column(&self) -> &str {
        match self {
            Comparison::Exact(column) | Comparison::Numeric(column) => column,
        }
    }
}

/// Ordered comparison of a dependent entity list (e.g. image URLs of a listing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildComparison {
    pub child: EntityType,
    /// Parent reference column in the child's source relation.
    pub source_parent_field: String,
    /// Parent reference column in the child's target table.
    pub target_parent_field: String,
    pub source_order: Vec<String>,
    pub target_order: Vec<String>,
    /// Target columns compared position by position.
    pub fields: Vec<String>,
}

/// Static mapping table for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySchema {
    pub entity_type: EntityType,
    pub source: SourceTable,
    pub target: TargetTable,
    pub fields: Vec<FieldMapping>,
    pub coalesced: Vec<Coalesce>,
    pub enums: Vec<EnumMapping>,
    pub aggregates: Vec<JsonAggregate>,
    pub defaults: Vec<DefaultValue>,
    pub foreign_keys: Vec<ForeignKey>,
    pub required: Vec<RequiredRule>,
    pub geo: Option<GeoColumns>,
    pub timestamps: Vec<String>,
    pub comparisons: Vec<Comparison>,
    pub children: Vec<ChildComparison>,
}

impl EntitySchema {
    pub fn new(entity_type: impl Into<EntityType>, source: SourceTable, target: TargetTable) -> Self {
        Self {
            entity_type: entity_type.into(),
            source,
            target,
            fields: Vec::new(),
            coalesced: Vec::new(),
            enums: Vec::new(),
            aggregates: Vec::new(),
            defaults: Vec::new(),
            foreign_keys: Vec::new(),
            required: Vec::new(),
            geo: None,
            timestamps: Vec::new(),
            comparisons: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn field(mut self, source: &str, target: &str, ty: SemanticType) -> Self {
        self.fields.push(FieldMapping {
            source: source.to_string(),
            target: target.to_string(),
            ty,
            required: false,
            fallback: None,
            now_when_null: false,
        });
        self
    }

    /// Field whose null source value fails the record.
    pub fn required_field(mut self, source: &str, target: &str, ty: SemanticType) -> Self {
        self.fields.push(FieldMapping {
            source: source.to_string(),
            target: target.to_string(),
            ty,
            required: true,
            fallback: None,
            now_when_null: false,
        });
        self
    }

    /// Field whose null source value is replaced with `fallback`.
    pub fn field_or(mut self, source: &str, target: &str, ty: SemanticType, fallback: FieldValue) -> Self {
        self.fields.push(FieldMapping {
            source: source.to_string(),
            target: target.to_string(),
            ty,
            required: false,
            fallback: Some(fallback),
            now_when_null: false,
        });
        self
    }

    /// Timestamp field whose null source value is replaced with the current time.
    pub fn timestamp_or_now(mut self, source: &str, target: &str) -> Self {
        self.fields.push(FieldMapping {
            source: source.to_string(),
            target: target.to_string(),
            ty: SemanticType::Timestamp,
            required: false,
            fallback: None,
            now_when_null: true,
        });
        self
    }

    pub fn coalesce(mut self, sources: &[&str], target: &str, ty: SemanticType) -> Self {
        self.coalesced.push(Coalesce {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            target: target.to_string(),
            ty,
        });
        self
    }

    pub fn enum_mapping(mut self, mapping: EnumMapping) -> Self {
        self.enums.push(mapping);
        self
    }

    pub fn aggregate(mut self, target: &str, entries: &[(&str, SemanticType, &str)]) -> Self {
        self.aggregates.push(JsonAggregate {
            target: target.to_string(),
            entries: entries
                .iter()
                .map(|(source, ty, key)| (source.to_string(), *ty, key.to_string()))
                .collect(),
        });
        self
    }

    pub fn default_value(mut self, target: &str, ty: SemanticType, value: FieldValue) -> Self {
        self.defaults.push(DefaultValue {
            target: target.to_string(),
            ty,
            value,
        });
        self
    }

    pub fn foreign_key(mut self, source: &str, target: &str, references: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            source: source.to_string(),
            target: target.to_string(),
            references: EntityType::from(references),
            required: true,
        });
        self
    }

    /// Foreign key that may legitimately be null at the source.
    pub fn optional_foreign_key(mut self, source: &str, target: &str, references: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            source: source.to_string(),
            target: target.to_string(),
            references: EntityType::from(references),
            required: false,
        });
        self
    }

    pub fn require(mut self, rule: RequiredRule) -> Self {
        self.required.push(rule);
        self
    }

    pub fn geo(mut self, latitude: &str, longitude: &str) -> Self {
        self.geo = Some(GeoColumns {
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
        });
        self
    }

    pub fn not_in_future(mut self, column: &str) -> Self {
        self.timestamps.push(column.to_string());
        self
    }

    pub fn compare(mut self, comparison: Comparison) -> Self {
        self.comparisons.push(comparison);
        self
    }

    pub fn compare_children(mut self, comparison: ChildComparison) -> Self {
        self.children.push(comparison);
        self
    }

    /// Entity types this one references, in declaration order without repeats.
    ///
    /// Self-references are left out. A self-referencing key resolves only
    /// against rows committed in an earlier batch, so a child sharing a batch
    /// with its parent fails with an unresolved reference.
    pub fn depends_on(&self) -> Vec<EntityType> {
        let mut parents: Vec<EntityType> = Vec::new();
        for fk in &self.foreign_keys {
            if fk.references != self.entity_type && !parents.contains(&fk.references) {
                parents.push(fk.references.clone());
            }
        }
        parents
    }

    /// Every source column the transformer reads, with the type it is decoded as.
    pub fn source_columns(&self) -> Vec<(String, SemanticType)> {
        let mut columns: Vec<(String, SemanticType)> = Vec::new();
        let mut push = |name: &str, ty: SemanticType| {
            if !columns.iter().any(|(existing, _)| existing == name) {
                columns.push((name.to_string(), ty));
            }
        };
        for field in &self.fields {
            push(&field.source, field.ty);
        }
        for coalesce in &self.coalesced {
            for source in &coalesce.sources {
                push(source, coalesce.ty);
            }
        }
        for mapping in &self.enums {
            push(&mapping.source, SemanticType::Text);
        }
        for aggregate in &self.aggregates {
            for (source, ty, _) in &aggregate.entries {
                push(source, *ty);
            }
        }
        for fk in &self.foreign_keys {
            push(&fk.source, SemanticType::Integer);
        }
        columns
    }

    /// Semantic type of a target column, including engine-synthesized columns.
    pub fn target_type(&self, column: &str) -> Option<SemanticType> {
        if column == self.target.primary_key || column == self.target.correlation_column {
            return Some(SemanticType::Integer);
        }
        if let Some(discriminator) = &self.target.discriminator {
            if discriminator.column == column {
                return Some(SemanticType::Text);
            }
        }
        if self.target.secondary_id_column.as_deref() == Some(column) {
            return Some(SemanticType::Uuid);
        }
        self.fields
            .iter()
            .find(|f| f.target == column)
            .map(|f| f.ty)
            .or_else(|| self.coalesced.iter().find(|c| c.target == column).map(|c| c.ty))
            .or_else(|| {
                self.enums
                    .iter()
                    .find(|e| e.target == column)
                    .map(|_| SemanticType::Text)
            })
            .or_else(|| {
                self.aggregates
                    .iter()
                    .find(|a| a.target == column)
                    .map(|_| SemanticType::Json)
            })
            .or_else(|| self.defaults.iter().find(|d| d.target == column).map(|d| d.ty))
            .or_else(|| {
                self.foreign_keys
                    .iter()
                    .find(|fk| fk.target == column)
                    .map(|_| SemanticType::Integer)
            })
    }

    pub fn lossy_enums(&self) -> impl Iterator<Item = &EnumMapping> {
        self.enums.iter().filter(|mapping| mapping.lossy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_schema() -> EntitySchema {
        EntitySchema::new(
            "image",
            SourceTable::table("c2c_images", "id"),
            TargetTable::new("listing_images"),
        )
        .coalesce(&["public_url", "file_path"], "url", SemanticType::Text)
        .field("file_path", "storage_path", SemanticType::Text)
        .foreign_key("listing_id", "listing_id", "listing")
    }

    #[test]
    fn test_source_columns_are_deduplicated() {
        let columns = image_schema().source_columns();
        let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["file_path", "public_url", "listing_id"]);
    }

    #[test]
    fn test_target_type_covers_synthesized_columns() {
        let schema = EntitySchema::new(
            "listing",
            SourceTable::table("c2c_listings", "id"),
            TargetTable::new("listings")
                .discriminated_by("source_type", "c2c")
                .with_secondary_id("uuid"),
        );
        assert_eq!(schema.target_type("id"), Some(SemanticType::Integer));
        assert_eq!(schema.target_type("legacy_id"), Some(SemanticType::Integer));
        assert_eq!(schema.target_type("source_type"), Some(SemanticType::Text));
        assert_eq!(schema.target_type("uuid"), Some(SemanticType::Uuid));
        assert_eq!(schema.target_type("missing"), None);
        assert_eq!(
            schema.target.conflict_columns(),
            vec!["source_type", "legacy_id"]
        );
    }

    #[test]
    fn test_depends_on_skips_self_references() {
        let schema = image_schema().optional_foreign_key("replaces_id", "replaces_id", "image");
        assert_eq!(schema.depends_on(), vec![EntityType::from("listing")]);
    }

    #[test]
    fn test_source_table_quotes_name() {
        let table = SourceTable::table("c2c_listings", "id").with_filter("status <> 'deleted'");
        assert_eq!(table.relation, "\"c2c_listings\"");
        assert_eq!(table.filter.as_deref(), Some("status <> 'deleted'"));
    }
}
