//! Field values and their semantic types.

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use uuid::Uuid;

/// Semantic type of a source or target column.
///
/// Readers cast columns to the matching database type so decoding never depends
/// on the exact width the legacy schema happened to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Decimal,
    Float,
    Text,
    Boolean,
    Timestamp,
    Json,
    Uuid,
}

impl SemanticType {
    /// Postgres type name used when casting a column of this type.
    pub fn sql_type(&self) -> &'static str {
        match self {
            SemanticType::Integer => "bigint",
            SemanticType::Decimal => "numeric",
            SemanticType::Float => "double precision",
            SemanticType::Text => "text",
            SemanticType::Boolean => "boolean",
            SemanticType::Timestamp => "timestamptz",
            SemanticType::Json => "jsonb",
            SemanticType::Uuid => "uuid",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::Integer => "integer",
            SemanticType::Decimal => "decimal",
            SemanticType::Float => "float",
            SemanticType::Text => "text",
            SemanticType::Boolean => "boolean",
            SemanticType::Timestamp => "timestamp",
            SemanticType::Json => "json",
            SemanticType::Uuid => "uuid",
        };
        f.write_str(name)
    }
}

/// A single typed value carried by an entity or transformed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Integer(i64),
    Decimal(BigDecimal),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
    Uuid(Uuid),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Semantic type of a non-null value.
    pub fn semantic_type(&self) -> Option<SemanticType> {
        match self {
            FieldValue::Null => None,
            FieldValue::Integer(_) => Some(SemanticType::Integer),
            FieldValue::Decimal(_) => Some(SemanticType::Decimal),
            FieldValue::Float(_) => Some(SemanticType::Float),
            FieldValue::Text(_) => Some(SemanticType::Text),
            FieldValue::Boolean(_) => Some(SemanticType::Boolean),
            FieldValue::Timestamp(_) => Some(SemanticType::Timestamp),
            FieldValue::Json(_) => Some(SemanticType::Json),
            FieldValue::Uuid(_) => Some(SemanticType::Uuid),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Numeric view used for tolerance-bounded comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Decimal(v) => v.to_f64(),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Converts the value into JSON for structured aggregation and document targets.
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Integer(v) => json!(v),
            FieldValue::Decimal(v) => match v.to_f64() {
                Some(f) => json!(f),
                None => JsonValue::String(v.to_string()),
            },
            FieldValue::Float(v) => json!(v),
            FieldValue::Text(v) => json!(v),
            FieldValue::Boolean(v) => json!(v),
            FieldValue::Timestamp(v) => json!(v.to_rfc3339()),
            FieldValue::Json(v) => v.clone(),
            FieldValue::Uuid(v) => json!(v.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("NULL"),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Decimal(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            FieldValue::Json(v) => write!(f, "{}", v),
            FieldValue::Uuid(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_numeric_view_covers_all_numeric_variants() {
        assert_eq!(FieldValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(FieldValue::Float(1.5).as_f64(), Some(1.5));
        let decimal = BigDecimal::from_str("19.99").unwrap();
        assert_eq!(FieldValue::Decimal(decimal).as_f64(), Some(19.99));
        assert_eq!(FieldValue::text("19.99").as_f64(), None);
    }

    #[test]
    fn test_to_json() {
        assert_eq!(FieldValue::Null.to_json(), JsonValue::Null);
        assert_eq!(FieldValue::text("new").to_json(), json!("new"));
        assert_eq!(FieldValue::Boolean(true).to_json(), json!(true));
    }

    #[test]
    fn test_semantic_type_of_null_is_none() {
        assert_eq!(FieldValue::Null.semantic_type(), None);
        assert_eq!(
            FieldValue::Integer(1).semantic_type(),
            Some(SemanticType::Integer)
        );
    }
}
