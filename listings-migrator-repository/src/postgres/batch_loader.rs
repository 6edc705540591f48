//! PostgreSQL implementation of the batch loader.
//!
//! One batch is one transaction of multi-row
//! `INSERT ... ON CONFLICT (correlation key) DO UPDATE ... RETURNING` statements,
//! so re-running a batch converges on the same rows instead of duplicating them.
//! A batch is split over as many statements as the bind-parameter limit requires.

use async_trait::async_trait;
use listings_migrator_shared::{EntitySchema, LoadedId, TransformedRecord};
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::debug;

use crate::errors::LoadError;
use crate::interfaces::BatchLoader;
use crate::postgres::sql::{push_field, quote_ident, LEGACY_ID_ALIAS, TARGET_ID_ALIAS};

/// Bind parameters PostgreSQL accepts in one statement.
const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Rows one upsert statement can carry when every row binds `columns` values.
fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// PostgreSQL-backed batch loader.
///
/// Requires a unique index on the target table's conflict columns
/// (`(source_type, legacy_id)` for discriminated tables, `(legacy_id)` otherwise).
pub struct PostgresBatchLoader {
    pool: sqlx::PgPool,
}

impl PostgresBatchLoader {
    /// Creates a new batch loader over the target pool.
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, LoadError> {
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Ensures every record carries the same columns in the same order.
    fn column_layout<'a>(
        schema: &EntitySchema,
        records: &'a [TransformedRecord],
    ) -> Result<Vec<&'a str>, LoadError> {
        let columns: Vec<&str> = match records.first() {
            Some(first) => first.column_names().collect(),
            None => return Ok(Vec::new()),
        };
        for record in records.iter().skip(1) {
            if !record.column_names().eq(columns.iter().copied()) {
                return Err(LoadError::InconsistentColumns(format!(
                    "{} source id {} does not match the batch layout",
                    schema.entity_type, record.source_id
                )));
            }
        }
        Ok(columns)
    }

    /// Builds the upsert statement for one batch.
    fn build_upsert<'a>(
        schema: &EntitySchema,
        columns: &[&str],
        records: &'a [TransformedRecord],
    ) -> QueryBuilder<'a, Postgres> {
        let target = &schema.target;
        let conflict = target.conflict_columns();

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut updates: Vec<String> = columns
            .iter()
            .filter(|c| !conflict.contains(*c))
            .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
            .collect();
        if updates.is_empty() {
            updates.push(format!(
                "{0} = EXCLUDED.{0}",
                quote_ident(&target.correlation_column)
            ));
        }

        let mut query_builder = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            quote_ident(&target.table),
            column_list
        ));

        query_builder.push_values(records, |mut b, record| {
            for field in &record.fields {
                push_field(&mut b, field);
            }
        });

        query_builder.push(format!(
            " ON CONFLICT ({}) DO UPDATE SET {} RETURNING {}::bigint AS {}, {}::bigint AS {}",
            conflict
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            updates.join(", "),
            quote_ident(&target.primary_key),
            quote_ident(TARGET_ID_ALIAS),
            quote_ident(&target.correlation_column),
            quote_ident(LEGACY_ID_ALIAS),
        ));

        query_builder
    }

    /// Runs the upserts inside an active transaction and pairs returned ids with the input.
    async fn load_batch_tx(
        &self,
        schema: &EntitySchema,
        records: &[TransformedRecord],
        tx: &mut sqlx::Transaction<'_, Postgres>,
    ) -> Result<Vec<LoadedId>, LoadError> {
        let columns = Self::column_layout(schema, records)?;
        let chunk_size = rows_per_statement(columns.len());

        let mut returned: HashMap<i64, i64> = HashMap::with_capacity(records.len());
        for chunk in records.chunks(chunk_size) {
            let mut query_builder = Self::build_upsert(schema, &columns, chunk);
            let rows = query_builder.build().fetch_all(&mut **tx).await?;
            for row in rows {
                let new_id: i64 = row.try_get(TARGET_ID_ALIAS)?;
                let legacy_id: i64 = row.try_get(LEGACY_ID_ALIAS)?;
                returned.insert(legacy_id, new_id);
            }
        }
        if records.len() > chunk_size {
            debug!(
                entity_type = %schema.entity_type,
                records = records.len(),
                statements = records.len().div_ceil(chunk_size),
                "Split batch over several upsert statements"
            );
        }

        records
            .iter()
            .map(|record| {
                returned
                    .get(&record.source_id)
                    .map(|new_id| LoadedId::new(record.source_id, *new_id))
                    .ok_or_else(|| LoadError::MissingReturnedId {
                        entity_type: schema.entity_type.to_string(),
                        source_id: record.source_id,
                    })
            })
            .collect()
    }
}

#[async_trait]
impl BatchLoader for PostgresBatchLoader {
    async fn load_batch(
        &self,
        schema: &EntitySchema,
        records: &[TransformedRecord],
    ) -> Result<Vec<LoadedId>, LoadError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        // Dropping the transaction on error rolls it back.
        let loaded = self.load_batch_tx(schema, records, &mut tx).await?;
        tx.commit().await?;

        debug!(
            entity_type = %schema.entity_type,
            table = %schema.target.table,
            loaded = loaded.len(),
            "Committed batch"
        );

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_per_statement_stays_under_bind_limit() {
        // A listing row binds a little over twenty values.
        let rows = rows_per_statement(26);
        assert_eq!(rows, 2520);
        assert!(rows * 26 <= MAX_BIND_PARAMS);
        assert!((rows + 1) * 26 > MAX_BIND_PARAMS);
    }

    #[test]
    fn test_rows_per_statement_edge_cases() {
        assert_eq!(rows_per_statement(1), MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(0), MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(MAX_BIND_PARAMS + 1), 1);
    }
}
