//! Schema transformer.
//!
//! Pure mapping from a source [`EntityRecord`] to a [`TransformedRecord`],
//! driven entirely by the entity's [`EntitySchema`]. The only outside state it
//! reads is the identifier mapper, for foreign keys.
//!
//! Column order in the output is fixed per schema: plain fields, coalesced
//! fields, enums, JSON aggregates, defaults, foreign keys, then the synthesized
//! discriminator, secondary id and correlation columns.
//!
//! Foreign keys resolve against the mapper as it stood before the batch, so a
//! self-reference to a record in the same batch is unresolved.

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::{DateTime, Utc};
use listings_migrator_shared::{
    EntityRecord, EntitySchema, FieldValue, SemanticType, TargetField, TransformedRecord,
};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::TransformError;
use crate::id_mapper::IdMapper;

/// Namespace for deterministic secondary identifiers.
const SECONDARY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_2a7e_94b3_4d0e_8f52_3b7a_c0de_5a11);

#[derive(Debug, Clone)]
pub struct SchemaTransformer {
    namespace: Uuid,
    /// Written into null timestamps of fields marked `now_when_null`.
    now: DateTime<Utc>,
}

impl Default for SchemaTransformer {
    fn default() -> Self {
        Self {
            namespace: SECONDARY_ID_NAMESPACE,
            now: Utc::now(),
        }
    }
}

impl SchemaTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transformer deriving secondary ids in a custom UUID namespace.
    pub fn with_namespace(namespace: Uuid) -> Self {
        Self {
            namespace,
            ..Self::default()
        }
    }

    /// Pins the time substituted for null timestamps.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Secondary id for a record: UUIDv5 over `{entity_type}:{source_id}`.
    ///
    /// Deterministic, so re-running a batch writes the same value.
    pub fn secondary_id(&self, record: &EntityRecord) -> Uuid {
        let name = format!("{}:{}", record.entity_type, record.source_id);
        Uuid::new_v5(&self.namespace, name.as_bytes())
    }

    /// Map a source record onto the target schema.
    ///
    /// # Arguments
    ///
    /// * `record` - Source record to transform
    /// * `schema` - Mapping table of the record's entity type
    /// * `mapper` - Identifier mapper consulted for every foreign key
    ///
    /// # Returns
    ///
    /// * `Ok(TransformedRecord)` - The record in target columns
    /// * `Err(TransformError)` - The record cannot be mapped and must be skipped
    pub fn transform(
        &self,
        record: &EntityRecord,
        schema: &EntitySchema,
        mapper: &IdMapper,
    ) -> Result<TransformedRecord, TransformError> {
        let mut fields = self.project_fields(record, schema)?;

        for fk in &schema.foreign_keys {
            let value = match required_source(record, schema, &fk.source)? {
                FieldValue::Null if fk.required => {
                    return Err(TransformError::MissingRequiredField {
                        entity_type: schema.entity_type.clone(),
                        source_id: record.source_id,
                        field: fk.source.clone(),
                    });
                }
                FieldValue::Null => FieldValue::Null,
                FieldValue::Integer(old_id) => match mapper.lookup(&fk.references, *old_id) {
                    Some(new_id) => FieldValue::Integer(new_id),
                    None => {
                        return Err(TransformError::UnresolvedReference {
                            entity_type: schema.entity_type.clone(),
                            source_id: record.source_id,
                            field: fk.source.clone(),
                            references: fk.references.clone(),
                            old_id: *old_id,
                        });
                    }
                },
                other => {
                    return Err(type_mismatch(
                        record,
                        schema,
                        &fk.source,
                        SemanticType::Integer,
                        other,
                    ));
                }
            };
            fields.push(TargetField {
                name: fk.target.clone(),
                ty: SemanticType::Integer,
                value,
            });
        }

        if let Some(discriminator) = &schema.target.discriminator {
            fields.push(TargetField {
                name: discriminator.column.clone(),
                ty: SemanticType::Text,
                value: FieldValue::Text(discriminator.tag.clone()),
            });
        }

        let secondary_id = schema
            .target
            .secondary_id_column
            .as_ref()
            .map(|column| {
                let id = self.secondary_id(record);
                fields.push(TargetField {
                    name: column.clone(),
                    ty: SemanticType::Uuid,
                    value: FieldValue::Uuid(id),
                });
                id
            });

        fields.push(TargetField {
            name: schema.target.correlation_column.clone(),
            ty: SemanticType::Integer,
            value: FieldValue::Integer(record.source_id),
        });

        Ok(TransformedRecord {
            entity_type: schema.entity_type.clone(),
            source_id: record.source_id,
            target_table: schema.target.table.clone(),
            secondary_id,
            fields,
        })
    }

    /// Target-vocabulary view of a source record without foreign keys or
    /// synthesized columns.
    ///
    /// Used to compare a source row against its migrated counterpart without
    /// needing the identifier mapper.
    pub fn project(
        &self,
        record: &EntityRecord,
        schema: &EntitySchema,
    ) -> Result<BTreeMap<String, FieldValue>, TransformError> {
        Ok(self
            .project_fields(record, schema)?
            .into_iter()
            .map(|field| (field.name, field.value))
            .collect())
    }

    fn project_fields(
        &self,
        record: &EntityRecord,
        schema: &EntitySchema,
    ) -> Result<Vec<TargetField>, TransformError> {
        let mut fields = Vec::with_capacity(
            schema.fields.len()
                + schema.coalesced.len()
                + schema.enums.len()
                + schema.aggregates.len()
                + schema.defaults.len()
                + schema.foreign_keys.len()
                + 3,
        );

        for mapping in &schema.fields {
            let mut value = required_source(record, schema, &mapping.source)?.clone();
            if value.is_null() {
                if mapping.now_when_null {
                    value = FieldValue::Timestamp(self.now);
                } else if let Some(fallback) = &mapping.fallback {
                    value = fallback.clone();
                } else if mapping.required {
                    return Err(TransformError::MissingRequiredField {
                        entity_type: schema.entity_type.clone(),
                        source_id: record.source_id,
                        field: mapping.source.clone(),
                    });
                }
            }
            fields.push(TargetField {
                name: mapping.target.clone(),
                ty: mapping.ty,
                value: coerce(record, schema, &mapping.source, value, mapping.ty)?,
            });
        }

        for coalesce in &schema.coalesced {
            let mut value = FieldValue::Null;
            for source in &coalesce.sources {
                let candidate = required_source(record, schema, source)?;
                if !candidate.is_null() {
                    value = coerce(record, schema, source, candidate.clone(), coalesce.ty)?;
                    break;
                }
            }
            fields.push(TargetField {
                name: coalesce.target.clone(),
                ty: coalesce.ty,
                value,
            });
        }

        for mapping in &schema.enums {
            let value = match required_source(record, schema, &mapping.source)? {
                FieldValue::Null => mapping
                    .fallback
                    .clone()
                    .map(FieldValue::Text)
                    .unwrap_or(FieldValue::Null),
                FieldValue::Text(raw) => match mapping.resolve(raw).or(mapping.fallback.as_deref()) {
                    Some(mapped) => FieldValue::text(mapped),
                    None => {
                        return Err(TransformError::UnmappedEnumValue {
                            entity_type: schema.entity_type.clone(),
                            source_id: record.source_id,
                            field: mapping.source.clone(),
                            value: raw.clone(),
                        });
                    }
                },
                other => {
                    return Err(type_mismatch(
                        record,
                        schema,
                        &mapping.source,
                        SemanticType::Text,
                        other,
                    ));
                }
            };
            fields.push(TargetField {
                name: mapping.target.clone(),
                ty: SemanticType::Text,
                value,
            });
        }

        for aggregate in &schema.aggregates {
            let mut object = Map::new();
            for (source, _, key) in &aggregate.entries {
                let value = required_source(record, schema, source)?;
                if !value.is_null() {
                    object.insert(key.clone(), value.to_json());
                }
            }
            fields.push(TargetField {
                name: aggregate.target.clone(),
                ty: SemanticType::Json,
                value: FieldValue::Json(JsonValue::Object(object)),
            });
        }

        for default in &schema.defaults {
            fields.push(TargetField {
                name: default.target.clone(),
                ty: default.ty,
                value: default.value.clone(),
            });
        }

        Ok(fields)
    }
}

fn required_source<'r>(
    record: &'r EntityRecord,
    schema: &EntitySchema,
    field: &str,
) -> Result<&'r FieldValue, TransformError> {
    record
        .get(field)
        .ok_or_else(|| TransformError::MissingSourceField {
            entity_type: schema.entity_type.clone(),
            source_id: record.source_id,
            field: field.to_string(),
        })
}

fn type_mismatch(
    record: &EntityRecord,
    schema: &EntitySchema,
    field: &str,
    expected: SemanticType,
    found: &FieldValue,
) -> TransformError {
    TransformError::TypeMismatch {
        entity_type: schema.entity_type.clone(),
        source_id: record.source_id,
        field: field.to_string(),
        expected,
        // Null never reaches a mismatch.
        found: found.semantic_type().unwrap_or(expected),
    }
}

/// Converts a value to the declared type, widening numerics where lossless enough.
fn coerce(
    record: &EntityRecord,
    schema: &EntitySchema,
    field: &str,
    value: FieldValue,
    ty: SemanticType,
) -> Result<FieldValue, TransformError> {
    let converted = match (value, ty) {
        (FieldValue::Null, _) => Some(FieldValue::Null),
        (value, ty) if value.semantic_type() == Some(ty) => Some(value),
        (FieldValue::Integer(v), SemanticType::Decimal) => Some(FieldValue::Decimal(BigDecimal::from(v))),
        (FieldValue::Integer(v), SemanticType::Float) => Some(FieldValue::Float(v as f64)),
        (FieldValue::Decimal(v), SemanticType::Float) => v.to_f64().map(FieldValue::Float),
        (FieldValue::Float(v), SemanticType::Decimal) => {
            BigDecimal::from_f64(v).map(FieldValue::Decimal)
        }
        (value, _) => {
            return Err(type_mismatch(record, schema, field, ty, &value));
        }
    };
    converted.ok_or_else(|| TransformError::TypeMismatch {
        entity_type: schema.entity_type.clone(),
        source_id: record.source_id,
        field: field.to_string(),
        expected: ty,
        found: ty,
    })
}
