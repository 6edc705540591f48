//! PostgreSQL implementation of the target inspector.
//!
//! Every query here is read-only. Offending-row queries return the total count
//! alongside a bounded sample of ids using a window count, in a single round trip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listings_migrator_shared::{
    EntitySchema, ForeignKey, GeoColumns, LoadedId, RequiredRule, SemanticType,
};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::BTreeMap;

use crate::errors::InspectorError;
use crate::interfaces::TargetInspector;
use crate::postgres::sql::{
    cast_column, decode_value, order_clause, qualified, quote_ident, LEGACY_ID_ALIAS,
    TABLE_EXISTS_SQL, TARGET_ID_ALIAS,
};
use crate::types::{OffendingRows, TargetRow};

/// Alias used for the inspected table in every query.
const T: &str = "t";

/// PostgreSQL-backed, read-only inspector of the target store.
pub struct PostgresTargetInspector {
    pool: sqlx::PgPool,
}

impl PostgresTargetInspector {
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, InspectorError> {
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Appends ` AND alias."source_type" = $n` for discriminated schemas.
    fn push_scope(query_builder: &mut QueryBuilder<'_, Postgres>, schema: &EntitySchema, alias: &str) {
        if let Some(discriminator) = &schema.target.discriminator {
            query_builder
                .push(format!(" AND {} = ", qualified(Some(alias), &discriminator.column)))
                .push_bind(discriminator.tag.clone());
        }
    }

    /// Starts `SELECT id, total FROM table t WHERE `; the caller appends the predicate.
    fn offending_query<'a>(schema: &EntitySchema) -> QueryBuilder<'a, Postgres> {
        QueryBuilder::new(format!(
            "SELECT {}::bigint AS id, (COUNT(*) OVER ())::bigint AS total FROM {} {} WHERE ",
            qualified(Some(T), &schema.target.primary_key),
            quote_ident(&schema.target.table),
            T
        ))
    }

    async fn run_offending(
        &self,
        mut query_builder: QueryBuilder<'_, Postgres>,
        schema: &EntitySchema,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError> {
        Self::push_scope(&mut query_builder, schema, T);
        query_builder
            .push(format!(
                " ORDER BY {} LIMIT ",
                qualified(Some(T), &schema.target.primary_key)
            ))
            .push_bind(limit.max(1));

        let rows = query_builder.build().fetch_all(&self.pool).await?;

        let mut offending = OffendingRows::default();
        for row in rows {
            offending.count = row.try_get("total")?;
            offending.sample_ids.push(row.try_get("id")?);
        }
        Ok(offending)
    }

    fn column_type(schema: &EntitySchema, column: &str) -> Result<SemanticType, InspectorError> {
        schema
            .target_type(column)
            .ok_or_else(|| InspectorError::UnknownColumn {
                entity_type: schema.entity_type.to_string(),
                column: column.to_string(),
            })
    }

    /// Starts a projection of the given columns plus the primary and correlation keys.
    fn projection_query<'a>(
        schema: &EntitySchema,
        columns: &[String],
    ) -> Result<QueryBuilder<'a, Postgres>, InspectorError> {
        let mut select = vec![
            format!(
                "{}::bigint AS {}",
                qualified(Some(T), &schema.target.primary_key),
                quote_ident(TARGET_ID_ALIAS)
            ),
            format!(
                "{}::bigint AS {}",
                qualified(Some(T), &schema.target.correlation_column),
                quote_ident(LEGACY_ID_ALIAS)
            ),
        ];
        for column in columns {
            select.push(cast_column(Some(T), column, Self::column_type(schema, column)?));
        }
        Ok(QueryBuilder::new(format!(
            "SELECT {} FROM {} {} WHERE ",
            select.join(", "),
            quote_ident(&schema.target.table),
            T
        )))
    }

    fn decode_row(
        schema: &EntitySchema,
        columns: &[String],
        row: &PgRow,
    ) -> Result<TargetRow, InspectorError> {
        let mut fields = BTreeMap::new();
        for column in columns {
            let value = decode_value(row, column, Self::column_type(schema, column)?)?;
            fields.insert(column.clone(), value);
        }
        Ok(TargetRow {
            id: row.try_get(TARGET_ID_ALIAS)?,
            legacy_id: row.try_get(LEGACY_ID_ALIAS)?,
            fields,
        })
    }
}

#[async_trait]
impl TargetInspector for PostgresTargetInspector {
    async fn count(&self, schema: &EntitySchema) -> Result<i64, InspectorError> {
        let mut query_builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT COUNT(*) FROM {} {} WHERE TRUE",
            quote_ident(&schema.target.table),
            T
        ));
        Self::push_scope(&mut query_builder, schema, T);
        let count: i64 = query_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn table_exists(&self, table: &str) -> Result<bool, InspectorError> {
        let exists: bool = sqlx::query_scalar(TABLE_EXISTS_SQL)
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn count_unmapped(&self, schema: &EntitySchema) -> Result<i64, InspectorError> {
        let mut query_builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT COUNT(*) FROM {} {} WHERE {} IS NULL",
            quote_ident(&schema.target.table),
            T,
            qualified(Some(T), &schema.target.correlation_column)
        ));
        Self::push_scope(&mut query_builder, schema, T);
        let count: i64 = query_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_orphans(
        &self,
        schema: &EntitySchema,
        fk: &ForeignKey,
        parent: &EntitySchema,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError> {
        let child_column = qualified(Some(T), &fk.target);
        let mut query_builder = Self::offending_query(schema);
        query_builder.push(format!(
            "{} IS NOT NULL AND NOT EXISTS (SELECT 1 FROM {} p WHERE {} = {}",
            child_column,
            quote_ident(&parent.target.table),
            qualified(Some("p"), &parent.target.primary_key),
            child_column
        ));
        Self::push_scope(&mut query_builder, parent, "p");
        query_builder.push(")");

        self.run_offending(query_builder, schema, limit).await
    }

    async fn find_required_violations(
        &self,
        schema: &EntitySchema,
        rule: &RequiredRule,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError> {
        let column = qualified(Some(T), rule.column());
        let predicate = match rule {
            RequiredRule::NotNull(_) => format!("{} IS NULL", column),
            RequiredRule::NotBlank(_) => {
                format!("({0} IS NULL OR btrim({0}::text) = '')", column)
            }
            RequiredRule::NonNegative(_) => format!("({0} IS NULL OR {0} < 0)", column),
        };
        let mut query_builder = Self::offending_query(schema);
        query_builder.push(predicate);

        self.run_offending(query_builder, schema, limit).await
    }

    async fn find_invalid_coordinates(
        &self,
        schema: &EntitySchema,
        geo: &GeoColumns,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError> {
        let lat = qualified(Some(T), &geo.latitude);
        let lon = qualified(Some(T), &geo.longitude);
        let mut query_builder = Self::offending_query(schema);
        query_builder.push(format!(
            "(({0} IS NOT NULL AND ({0} < -90 OR {0} > 90)) OR ({1} IS NOT NULL AND ({1} < -180 OR {1} > 180)))",
            lat, lon
        ));

        self.run_offending(query_builder, schema, limit).await
    }

    async fn find_future_timestamps(
        &self,
        schema: &EntitySchema,
        column: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<OffendingRows, InspectorError> {
        let mut query_builder = Self::offending_query(schema);
        query_builder
            .push(format!("{} > ", qualified(Some(T), column)))
            .push_bind(now);

        self.run_offending(query_builder, schema, limit).await
    }

    async fn sample_legacy_ids(
        &self,
        schema: &EntitySchema,
        size: i64,
    ) -> Result<Vec<i64>, InspectorError> {
        let mut query_builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {}::bigint FROM {} {} WHERE TRUE",
            qualified(Some(T), &schema.target.correlation_column),
            quote_ident(&schema.target.table),
            T
        ));
        Self::push_scope(&mut query_builder, schema, T);
        query_builder.push(" ORDER BY random() LIMIT ").push_bind(size);

        let ids: Vec<i64> = query_builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn fetch_by_legacy_ids(
        &self,
        schema: &EntitySchema,
        legacy_ids: &[i64],
        columns: &[String],
    ) -> Result<Vec<TargetRow>, InspectorError> {
        if legacy_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query_builder = Self::projection_query(schema, columns)?;
        query_builder
            .push(format!(
                "{} = ANY(",
                qualified(Some(T), &schema.target.correlation_column)
            ))
            .push_bind(legacy_ids.to_vec())
            .push(")");
        Self::push_scope(&mut query_builder, schema, T);
        query_builder.push(format!(
            " ORDER BY {}",
            qualified(Some(T), &schema.target.correlation_column)
        ));

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| Self::decode_row(schema, columns, row))
            .collect()
    }

    async fn fetch_children(
        &self,
        child: &EntitySchema,
        parent_field: &str,
        parent_id: i64,
        order: &[String],
        columns: &[String],
    ) -> Result<Vec<TargetRow>, InspectorError> {
        let mut query_builder = Self::projection_query(child, columns)?;
        query_builder
            .push(format!("{} = ", qualified(Some(T), parent_field)))
            .push_bind(parent_id);
        Self::push_scope(&mut query_builder, child, T);
        let order_by = if order.is_empty() {
            qualified(Some(T), &child.target.primary_key)
        } else {
            order_clause(Some(T), order)
        };
        query_builder.push(format!(" ORDER BY {}", order_by));

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| Self::decode_row(child, columns, row))
            .collect()
    }

    async fn load_id_mappings(
        &self,
        schema: &EntitySchema,
        up_to_legacy_id: Option<i64>,
    ) -> Result<Vec<LoadedId>, InspectorError> {
        let legacy = qualified(Some(T), &schema.target.correlation_column);
        let mut query_builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {}::bigint AS legacy_id, {}::bigint AS id FROM {} {} WHERE {} IS NOT NULL",
            legacy,
            qualified(Some(T), &schema.target.primary_key),
            quote_ident(&schema.target.table),
            T,
            legacy
        ));
        Self::push_scope(&mut query_builder, schema, T);
        if let Some(bound) = up_to_legacy_id {
            query_builder
                .push(format!(" AND {} <= ", legacy))
                .push_bind(bound);
        }
        query_builder.push(format!(" ORDER BY {}", legacy));

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<LoadedId, InspectorError> {
                Ok(LoadedId::new(
                    row.try_get("legacy_id")?,
                    row.try_get("id")?,
                ))
            })
            .collect()
    }
}
