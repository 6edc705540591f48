//! Integration tests for the PostgreSQL store implementations.
//!
//! These tests require a real PostgreSQL database (`DATABASE_URL`) and use SQLx
//! test macros for isolation; legacy and unified tables share one database.
//!
//! Run with: `cargo test --test postgres_stores -- --ignored`

use chrono::Utc;
use listings_migrator_repository::{
    BatchLoader, CheckpointRepository, PostgresBatchLoader, PostgresCheckpointRepository,
    PostgresSourceReader, PostgresTargetInspector, SourceReader, TargetInspector,
};
use listings_migrator_shared::{
    listings_catalog, BatchCheckpoint, CheckpointStatus, EntitySchema, EntityType, FieldValue,
    RequiredRule, SemanticType, TargetField, TransformedRecord,
};
use uuid::Uuid;

fn schema(name: &str) -> EntitySchema {
    listings_catalog()
        .unwrap()
        .require(&EntityType::from(name))
        .unwrap()
        .clone()
}

fn category_record(source_id: i64, name: &str) -> TransformedRecord {
    let field = |name: &str, ty, value| TargetField {
        name: name.to_string(),
        ty,
        value,
    };
    TransformedRecord {
        entity_type: EntityType::from("category"),
        source_id,
        target_table: "categories".to_string(),
        secondary_id: None,
        fields: vec![
            field("name", SemanticType::Text, FieldValue::text(name)),
            field("slug", SemanticType::Text, FieldValue::Null),
            field("is_active", SemanticType::Boolean, FieldValue::Boolean(true)),
            field("sort_order", SemanticType::Integer, FieldValue::Integer(0)),
            field("created_at", SemanticType::Timestamp, FieldValue::Null),
            field("legacy_id", SemanticType::Integer, FieldValue::Integer(source_id)),
        ],
    }
}

// ============================================================================
// Source Reader Tests
// ============================================================================

#[sqlx::test(migrations = "src/postgres/migrations", fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn test_fetch_pages_in_primary_key_order(pool: sqlx::PgPool) {
    let reader = PostgresSourceReader::new(pool).await.unwrap();
    let listing = schema("listing");

    let first = reader.fetch(&listing, 0, 2).await.unwrap();
    let second = reader.fetch(&listing, 2, 2).await.unwrap();
    let past_end = reader.fetch(&listing, 3, 2).await.unwrap();

    let ids: Vec<i64> = first.iter().chain(second.iter()).map(|r| r.source_id).collect();
    assert_eq!(ids, vec![100, 101, 102]);
    assert!(past_end.is_empty());
    assert_eq!(reader.count(&listing).await.unwrap(), 3);

    // Narrow integer and numeric columns decode through their casts.
    let bike = &first[0];
    assert_eq!(bike.get("category_id"), Some(&FieldValue::Integer(10)));
    assert_eq!(bike.get("price").and_then(|v| v.as_f64()), Some(450.0));
    assert_eq!(first[1].get("price"), Some(&FieldValue::Null));
    assert_eq!(bike.get("show_on_map"), Some(&FieldValue::Boolean(true)));
    assert_eq!(
        bike.get("metadata"),
        Some(&FieldValue::Json(serde_json::json!({"source": "import"})))
    );
}

#[sqlx::test(migrations = "src/postgres/migrations", fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn test_fetch_ids_is_bounded(pool: sqlx::PgPool) {
    let reader = PostgresSourceReader::new(pool).await.unwrap();
    let listing = schema("listing");

    assert_eq!(reader.fetch_ids(&listing, None).await.unwrap(), vec![100, 101, 102]);
    assert_eq!(reader.fetch_ids(&listing, Some(101)).await.unwrap(), vec![100, 101]);
}

#[sqlx::test(migrations = "src/postgres/migrations", fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn test_table_exists_on_both_stores(pool: sqlx::PgPool) {
    let reader = PostgresSourceReader::new(pool.clone()).await.unwrap();
    let inspector = PostgresTargetInspector::new(pool).await.unwrap();

    for table in &schema("product").source.tables {
        assert!(reader.table_exists(table).await.unwrap(), "{}", table);
    }
    assert!(!reader.table_exists("c2c_reviews").await.unwrap());
    assert!(inspector.table_exists("storefronts").await.unwrap());
    assert!(!inspector.table_exists("listing_reviews").await.unwrap());
}

#[sqlx::test(migrations = "src/postgres/migrations", fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn test_fetch_children_respects_order(pool: sqlx::PgPool) {
    let reader = PostgresSourceReader::new(pool).await.unwrap();
    let image = schema("image");

    let children = reader
        .fetch_children(&image, "listing_id", 100, &["display_order".to_string(), "id".to_string()])
        .await
        .unwrap();

    let ids: Vec<i64> = children.iter().map(|r| r.source_id).collect();
    assert_eq!(ids, vec![1000, 1001]);
    assert!(reader.fetch_children(&image, "listing_id", 101, &[]).await.unwrap().is_empty());
}

// ============================================================================
// Batch Loader Tests
// ============================================================================

#[sqlx::test(migrations = "src/postgres/migrations", fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn test_load_batch_is_idempotent(pool: sqlx::PgPool) {
    let loader = PostgresBatchLoader::new(pool.clone()).await.unwrap();
    let category = schema("category");
    let batch = vec![category_record(10, "Bikes"), category_record(11, "Books")];

    let first = loader.load_batch(&category, &batch).await.unwrap();
    let second = loader.load_batch(&category, &batch).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first[0].source_id, 10);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[sqlx::test(migrations = "src/postgres/migrations", fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn test_batch_over_bind_limit_is_split(pool: sqlx::PgPool) {
    let loader = PostgresBatchLoader::new(pool.clone()).await.unwrap();
    let category = schema("category");
    // Six columns per row: more than 65535 binds in a single statement.
    let batch: Vec<TransformedRecord> = (1..=11_000)
        .map(|id| category_record(id, &format!("Category {}", id)))
        .collect();

    let loaded = loader.load_batch(&category, &batch).await.unwrap();

    assert_eq!(loaded.len(), batch.len());
    for (record, pair) in batch.iter().zip(&loaded) {
        assert_eq!(pair.source_id, record.source_id);
    }
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 11_000);
}

#[sqlx::test(migrations = "src/postgres/migrations", fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn test_failed_batch_rolls_back(pool: sqlx::PgPool) {
    let loader = PostgresBatchLoader::new(pool.clone()).await.unwrap();
    let category = schema("category");
    let mut broken = category_record(11, "Books");
    // `name` is NOT NULL in the target.
    broken.fields[0].value = FieldValue::Null;

    let result = loader
        .load_batch(&category, &[category_record(10, "Bikes"), broken])
        .await;

    assert!(result.is_err());
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

// ============================================================================
// Checkpoint Repository Tests
// ============================================================================

#[sqlx::test(migrations = "src/postgres/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_save_and_get_checkpoint(pool: sqlx::PgPool) {
    let repository = PostgresCheckpointRepository::new(pool).await.unwrap();
    let entity_type = EntityType::from("listing");

    assert!(repository.get_checkpoint(&entity_type).await.unwrap().is_none());

    let mut checkpoint = BatchCheckpoint::pending(entity_type.clone());
    checkpoint.last_committed_offset = 100;
    checkpoint.last_source_id = Some(4711);
    checkpoint.status = CheckpointStatus::InProgress;
    repository.save_checkpoint(&checkpoint).await.unwrap();

    checkpoint.status = CheckpointStatus::Completed;
    repository.save_checkpoint(&checkpoint).await.unwrap();

    let stored = repository.get_checkpoint(&entity_type).await.unwrap().unwrap();
    assert_eq!(stored.last_committed_offset, 100);
    assert_eq!(stored.last_source_id, Some(4711));
    assert_eq!(stored.status, CheckpointStatus::Completed);
}

#[sqlx::test(migrations = "src/postgres/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_checkpoint_repository_rejects_unreachable_store(pool: sqlx::PgPool) {
    pool.close().await;

    assert!(PostgresCheckpointRepository::new(pool).await.is_err());
}

// ============================================================================
// Target Inspector Tests
// ============================================================================

#[sqlx::test(migrations = "src/postgres/migrations", fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn test_inspector_finds_orphans_and_violations(pool: sqlx::PgPool) {
    sqlx::query(
        "INSERT INTO listings (source_type, legacy_id, uuid, user_id, category_id, title, price, latitude, created_at)
         VALUES ('c2c', 1, $1, 1, 999, 'ok', 10, 91.5, NOW() + INTERVAL '1 day'),
                ('c2c', 2, $2, 1, NULL, '  ', -1, 10, NOW())",
    )
    .bind(Uuid::new_v4())
    .bind(Uuid::new_v4())
    .execute(&pool)
    .await
    .unwrap();

    let inspector = PostgresTargetInspector::new(pool).await.unwrap();
    let listing = schema("listing");
    let category = schema("category");
    let category_fk = listing
        .foreign_keys
        .iter()
        .find(|fk| fk.target == "category_id")
        .unwrap();

    assert_eq!(inspector.count(&listing).await.unwrap(), 2);
    assert_eq!(inspector.count(&schema("product")).await.unwrap(), 0);

    let orphans = inspector
        .find_orphans(&listing, category_fk, &category, 20)
        .await
        .unwrap();
    assert_eq!(orphans.count, 1);

    let blank_titles = inspector
        .find_required_violations(&listing, &RequiredRule::NotBlank("title".into()), 20)
        .await
        .unwrap();
    assert_eq!(blank_titles.count, 1);

    let geo = listing.geo.clone().unwrap();
    let coordinates = inspector.find_invalid_coordinates(&listing, &geo, 20).await.unwrap();
    assert_eq!(coordinates.count, 1);

    let future = inspector
        .find_future_timestamps(&listing, "created_at", Utc::now(), 20)
        .await
        .unwrap();
    assert_eq!(future.count, 1);

    let mappings = inspector.load_id_mappings(&listing, Some(1)).await.unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].source_id, 1);
}

#[sqlx::test(migrations = "src/postgres/migrations", fixtures("schema"))]
#[ignore = "requires DATABASE_URL"]
async fn test_inspector_counts_rows_without_legacy_id(pool: sqlx::PgPool) {
    sqlx::query(
        "INSERT INTO listings (source_type, legacy_id, uuid, user_id, title)
         VALUES ('c2c', NULL, $1, 1, 'native'),
                ('c2c', 7, $2, 1, 'migrated'),
                ('b2c', NULL, $3, 1, 'native product')",
    )
    .bind(Uuid::new_v4())
    .bind(Uuid::new_v4())
    .bind(Uuid::new_v4())
    .execute(&pool)
    .await
    .unwrap();

    let inspector = PostgresTargetInspector::new(pool).await.unwrap();

    assert_eq!(inspector.count_unmapped(&schema("listing")).await.unwrap(), 1);
    assert_eq!(inspector.count_unmapped(&schema("product")).await.unwrap(), 1);
    assert_eq!(inspector.count_unmapped(&schema("image")).await.unwrap(), 0);
}
