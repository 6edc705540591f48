//! PostgreSQL implementation of the source reader.
//!
//! Issues `ORDER BY pk LIMIT n OFFSET m` pages against the legacy relations and
//! never writes to the source.

use async_trait::async_trait;
use listings_migrator_shared::{EntityRecord, EntitySchema};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use tracing::debug;

use crate::errors::SourceError;
use crate::interfaces::SourceReader;
use crate::postgres::sql::{
    cast_column, decode_value, order_clause, quote_ident, SOURCE_ID_ALIAS, TABLE_EXISTS_SQL,
};

/// PostgreSQL-backed source reader.
pub struct PostgresSourceReader {
    pool: sqlx::PgPool,
}

impl PostgresSourceReader {
    /// Creates a new source reader over the given pool.
    ///
    /// # Arguments
    ///
    /// * `pool` - Connection pool for the legacy store
    ///
    /// # Returns
    ///
    /// * `Ok(PostgresSourceReader)` - Ready-to-use reader
    /// * `Err(SourceError)` - If the source does not answer a trivial query
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, SourceError> {
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(Self { pool })
    }

    fn select_clause(schema: &EntitySchema) -> String {
        let mut columns = vec![format!(
            "{}::bigint AS {}",
            quote_ident(&schema.source.primary_key),
            quote_ident(SOURCE_ID_ALIAS)
        )];
        columns.extend(
            schema
                .source_columns()
                .iter()
                .map(|(name, ty)| cast_column(None, name, *ty)),
        );
        format!("SELECT {} FROM {}", columns.join(", "), schema.source.relation)
    }

    /// `WHERE` clause joining the schema's active filter with an extra predicate.
    fn where_clause(schema: &EntitySchema, predicate: Option<&str>) -> String {
        let mut predicates: Vec<String> = Vec::new();
        if let Some(filter) = &schema.source.filter {
            predicates.push(format!("({})", filter));
        }
        if let Some(predicate) = predicate {
            predicates.push(predicate.to_string());
        }
        if predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", predicates.join(" AND "))
        }
    }

    fn decode_record(schema: &EntitySchema, row: &PgRow) -> Result<EntityRecord, SourceError> {
        let source_id: i64 = row.try_get(SOURCE_ID_ALIAS)?;
        let mut record = EntityRecord::new(schema.entity_type.clone(), source_id);
        for (column, ty) in schema.source_columns() {
            let value = decode_value(row, &column, ty).map_err(|e| SourceError::DecodeError {
                entity_type: schema.entity_type.to_string(),
                column: column.clone(),
                message: e.to_string(),
            })?;
            record.fields.insert(column, value);
        }
        Ok(record)
    }
}

#[async_trait]
impl SourceReader for PostgresSourceReader {
    async fn fetch(
        &self,
        schema: &EntitySchema,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<EntityRecord>, SourceError> {
        let sql = format!(
            "{}{} ORDER BY {} LIMIT $1 OFFSET $2",
            Self::select_clause(schema),
            Self::where_clause(schema, None),
            quote_ident(&schema.source.primary_key)
        );

        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        debug!(
            entity_type = %schema.entity_type,
            offset,
            limit,
            fetched = rows.len(),
            "Fetched source page"
        );

        rows.iter()
            .map(|row| Self::decode_record(schema, row))
            .collect()
    }

    async fn table_exists(&self, table: &str) -> Result<bool, SourceError> {
        let exists: bool = sqlx::query_scalar(TABLE_EXISTS_SQL)
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn count(&self, schema: &EntitySchema) -> Result<i64, SourceError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            schema.source.relation,
            Self::where_clause(schema, None)
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn fetch_ids(
        &self,
        schema: &EntitySchema,
        up_to_id: Option<i64>,
    ) -> Result<Vec<i64>, SourceError> {
        let pk = quote_ident(&schema.source.primary_key);
        let bound = format!("{} <= $1", pk);
        let predicate = up_to_id.map(|_| bound.as_str());
        let sql = format!(
            "SELECT {}::bigint FROM {}{} ORDER BY {}",
            pk,
            schema.source.relation,
            Self::where_clause(schema, predicate),
            pk
        );

        let mut query = sqlx::query_scalar::<Postgres, i64>(&sql);
        if let Some(up_to_id) = up_to_id {
            query = query.bind(up_to_id);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn fetch_by_ids(
        &self,
        schema: &EntitySchema,
        ids: &[i64],
    ) -> Result<Vec<EntityRecord>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let pk = quote_ident(&schema.source.primary_key);
        let predicate = format!("{} = ANY($1)", pk);
        let sql = format!(
            "{}{} ORDER BY {}",
            Self::select_clause(schema),
            Self::where_clause(schema, Some(&predicate)),
            pk
        );

        let rows = sqlx::query(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Self::decode_record(schema, row))
            .collect()
    }

    async fn fetch_children(
        &self,
        child: &EntitySchema,
        parent_field: &str,
        parent_id: i64,
        order: &[String],
    ) -> Result<Vec<EntityRecord>, SourceError> {
        let predicate = format!("{} = $1", quote_ident(parent_field));
        let order_by = if order.is_empty() {
            quote_ident(&child.source.primary_key)
        } else {
            order_clause(None, order)
        };
        let sql = format!(
            "{}{} ORDER BY {}",
            Self::select_clause(child),
            Self::where_clause(child, Some(&predicate)),
            order_by
        );

        let rows = sqlx::query(&sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Self::decode_record(child, row))
            .collect()
    }
}
