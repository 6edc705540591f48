//! SQL building and value (de)serialization shared by the PostgreSQL stores.
//!
//! Table and column names come from the schema catalog, never from user input,
//! but are still quoted so mixed-case or reserved names survive.

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::{DateTime, Utc};
use listings_migrator_shared::{FieldValue, SemanticType, TargetField};
use sqlx::postgres::{PgRow, Postgres};
use sqlx::query_builder::Separated;
use sqlx::Row;
use uuid::Uuid;

pub(crate) const SOURCE_ID_ALIAS: &str = "__source_id";
pub(crate) const TARGET_ID_ALIAS: &str = "__id";
pub(crate) const LEGACY_ID_ALIAS: &str = "__legacy_id";

/// Existence of `$1` among the tables visible in the connection's current schema.
pub(crate) const TABLE_EXISTS_SQL: &str = "SELECT EXISTS (SELECT FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = $1)";

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `alias."column"`, or just the quoted column without an alias.
pub(crate) fn qualified(alias: Option<&str>, column: &str) -> String {
    match alias {
        Some(alias) => format!("{}.{}", alias, quote_ident(column)),
        None => quote_ident(column),
    }
}

/// Select-list item casting a column to its semantic type: `"col"::bigint AS "col"`.
pub(crate) fn cast_column(alias: Option<&str>, column: &str, ty: SemanticType) -> String {
    format!(
        "{}::{} AS {}",
        qualified(alias, column),
        ty.sql_type(),
        quote_ident(column)
    )
}

pub(crate) fn order_clause(alias: Option<&str>, columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| qualified(alias, column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decode a column previously cast with [`cast_column`].
pub(crate) fn decode_value(
    row: &PgRow,
    column: &str,
    ty: SemanticType,
) -> Result<FieldValue, sqlx::Error> {
    let value = match ty {
        SemanticType::Integer => row
            .try_get::<Option<i64>, _>(column)?
            .map(FieldValue::Integer),
        SemanticType::Decimal => row
            .try_get::<Option<BigDecimal>, _>(column)?
            .map(FieldValue::Decimal),
        SemanticType::Float => row.try_get::<Option<f64>, _>(column)?.map(FieldValue::Float),
        SemanticType::Text => row
            .try_get::<Option<String>, _>(column)?
            .map(FieldValue::Text),
        SemanticType::Boolean => row
            .try_get::<Option<bool>, _>(column)?
            .map(FieldValue::Boolean),
        SemanticType::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(column)?
            .map(FieldValue::Timestamp),
        SemanticType::Json => row
            .try_get::<Option<serde_json::Value>, _>(column)?
            .map(FieldValue::Json),
        SemanticType::Uuid => row.try_get::<Option<Uuid>, _>(column)?.map(FieldValue::Uuid),
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

/// Bind one target column inside a `push_values` row.
///
/// Nulls are bound with the column's declared type, and integer or float values
/// headed for wider numeric columns are widened first.
pub(crate) fn push_field<'qb, 'args: 'qb>(
    b: &mut Separated<'qb, 'args, Postgres, &'static str>,
    field: &TargetField,
) {
    match (&field.value, field.ty) {
        (FieldValue::Null, ty) => push_null(b, ty),
        (FieldValue::Integer(v), SemanticType::Decimal) => {
            b.push_bind(BigDecimal::from(*v));
        }
        (FieldValue::Integer(v), SemanticType::Float) => {
            b.push_bind(*v as f64);
        }
        (FieldValue::Float(v), SemanticType::Decimal) => {
            b.push_bind(BigDecimal::from_f64(*v));
        }
        (FieldValue::Decimal(v), SemanticType::Float) => {
            b.push_bind(v.to_f64());
        }
        (FieldValue::Integer(v), _) => {
            b.push_bind(*v);
        }
        (FieldValue::Decimal(v), _) => {
            b.push_bind(v.clone());
        }
        (FieldValue::Float(v), _) => {
            b.push_bind(*v);
        }
        (FieldValue::Text(v), _) => {
            b.push_bind(v.clone());
        }
        (FieldValue::Boolean(v), _) => {
            b.push_bind(*v);
        }
        (FieldValue::Timestamp(v), _) => {
            b.push_bind(*v);
        }
        (FieldValue::Json(v), _) => {
            b.push_bind(v.clone());
        }
        (FieldValue::Uuid(v), _) => {
            b.push_bind(*v);
        }
    }
}

fn push_null<'qb, 'args: 'qb>(b: &mut Separated<'qb, 'args, Postgres, &'static str>, ty: SemanticType) {
    match ty {
        SemanticType::Integer => {
            b.push_bind(None::<i64>);
        }
        SemanticType::Decimal => {
            b.push_bind(None::<BigDecimal>);
        }
        SemanticType::Float => {
            b.push_bind(None::<f64>);
        }
        SemanticType::Text => {
            b.push_bind(None::<String>);
        }
        SemanticType::Boolean => {
            b.push_bind(None::<bool>);
        }
        SemanticType::Timestamp => {
            b.push_bind(None::<DateTime<Utc>>);
        }
        SemanticType::Json => {
            b.push_bind(None::<serde_json::Value>);
        }
        SemanticType::Uuid => {
            b.push_bind(None::<Uuid>);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("title"), "\"title\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_cast_column() {
        assert_eq!(
            cast_column(Some("t"), "price", SemanticType::Decimal),
            "t.\"price\"::numeric AS \"price\""
        );
        assert_eq!(
            cast_column(None, "id", SemanticType::Integer),
            "\"id\"::bigint AS \"id\""
        );
    }

    #[test]
    fn test_order_clause() {
        let order = vec!["display_order".to_string(), "id".to_string()];
        assert_eq!(
            order_clause(Some("c"), &order),
            "c.\"display_order\", c.\"id\""
        );
    }
}
