//! Default catalog: legacy marketplace tables into the unified listings schema.
//!
//! | entity type  | source                      | target            | tag   |
//! |--------------|-----------------------------|-------------------|-------|
//! | `category`   | `c2c_categories`            | `categories`      |       |
//! | `storefront` | `b2c_stores`                | `storefronts`     |       |
//! | `listing`    | `c2c_listings`              | `listings`        | `c2c` |
//! | `product`    | `b2c_products` + store owner| `listings`        | `b2c` |
//! | `image`      | `c2c_images`                | `listing_images`  |       |
//!
//! Product stock status is collapsed from three states onto the two-state
//! listing status (`in_stock`/`low_stock` -> `active`, `out_of_stock` ->
//! `inactive`). The mapping is marked lossy: the low-stock distinction cannot be
//! recovered from the target.

use crate::schema::{
    ChildComparison, Comparison, EntitySchema, EnumMapping, RequiredRule, SchemaCatalog,
    SchemaError, SourceTable, TargetTable,
};
use crate::types::{EntityType, FieldValue, SemanticType};

use bigdecimal::BigDecimal;
use SemanticType::{Boolean, Decimal, Float, Integer, Json, Text, Timestamp};

const DEFAULT_CURRENCY: &str = "RSD";
const DEFAULT_VISIBILITY: &str = "public";
const DEFAULT_LOCATION_PRIVACY: &str = "exact";

/// Builds the default listings migration catalog.
pub fn listings_catalog() -> Result<SchemaCatalog, SchemaError> {
    SchemaCatalog::new(vec![
        category_schema(),
        storefront_schema(),
        listing_schema(),
        product_schema(),
        image_schema(),
    ])
}

fn category_schema() -> EntitySchema {
    EntitySchema::new(
        "category",
        SourceTable::table("c2c_categories", "id"),
        TargetTable::new("categories"),
    )
    .required_field("name", "name", Text)
    .field("slug", "slug", Text)
    .field_or("is_active", "is_active", Boolean, FieldValue::Boolean(true))
    .field_or("sort_order", "sort_order", Integer, FieldValue::Integer(0))
    .field("created_at", "created_at", Timestamp)
    .require(RequiredRule::NotBlank("name".into()))
    .not_in_future("created_at")
    .compare(Comparison::Exact("name".into()))
    .compare(Comparison::Exact("slug".into()))
}

fn storefront_schema() -> EntitySchema {
    EntitySchema::new(
        "storefront",
        SourceTable::table("b2c_stores", "id"),
        TargetTable::new("storefronts"),
    )
    .required_field("user_id", "user_id", Integer)
    .required_field("name", "name", Text)
    .required_field("slug", "slug", Text)
    .field("description", "description", Text)
    .field("phone", "phone", Text)
    .field("email", "email", Text)
    .field("website", "website", Text)
    .field("address", "address", Text)
    .field("city", "city", Text)
    .field("postal_code", "postal_code", Text)
    .field("country", "country", Text)
    .field("latitude", "latitude", Float)
    .field("longitude", "longitude", Float)
    .field_or("is_active", "is_active", Boolean, FieldValue::Boolean(true))
    .field("created_at", "created_at", Timestamp)
    .field("updated_at", "updated_at", Timestamp)
    .require(RequiredRule::NotNull("user_id".into()))
    .require(RequiredRule::NotBlank("name".into()))
    .require(RequiredRule::NotBlank("slug".into()))
    .geo("latitude", "longitude")
    .not_in_future("created_at")
    .not_in_future("updated_at")
    .compare(Comparison::Exact("name".into()))
    .compare(Comparison::Exact("slug".into()))
}

fn listing_schema() -> EntitySchema {
    EntitySchema::new(
        "listing",
        SourceTable::table("c2c_listings", "id"),
        TargetTable::new("listings")
            .discriminated_by("source_type", "c2c")
            .with_secondary_id("uuid"),
    )
    .field_or("user_id", "user_id", Integer, FieldValue::Integer(1))
    .required_field("title", "title", Text)
    .field("description", "description", Text)
    .field_or("price", "price", Decimal, zero_price())
    .field_or("views_count", "views_count", Integer, FieldValue::Integer(0))
    .field("latitude", "latitude", Float)
    .field("longitude", "longitude", Float)
    .field("show_on_map", "show_on_map", Boolean)
    .field("show_on_map", "has_individual_location", Boolean)
    .field("location", "individual_address", Text)
    .timestamp_or_now("created_at", "created_at")
    .timestamp_or_now("updated_at", "updated_at")
    .enum_mapping(
        EnumMapping::new("status", "status")
            .map("active", "active")
            .map("sold", "sold")
            .map("inactive", "inactive")
            .map("archived", "archived")
            .map("draft", "draft")
            .fallback("draft"),
    )
    .aggregate(
        "attributes",
        &[
            ("condition", Text, "condition"),
            ("address_city", Text, "city"),
            ("address_country", Text, "country"),
            ("original_language", Text, "original_language"),
            ("metadata", Json, "metadata"),
            ("address_multilingual", Json, "address_multilingual"),
        ],
    )
    .default_value("currency", Text, FieldValue::text(DEFAULT_CURRENCY))
    .default_value("visibility", Text, FieldValue::text(DEFAULT_VISIBILITY))
    .default_value("quantity", Integer, FieldValue::Integer(1))
    .default_value("favorites_count", Integer, FieldValue::Integer(0))
    .default_value("location_privacy", Text, FieldValue::text(DEFAULT_LOCATION_PRIVACY))
    .foreign_key("category_id", "category_id", "category")
    .optional_foreign_key("storefront_id", "storefront_id", "storefront")
    .listing_rules()
    .compare_children(ChildComparison {
        child: EntityType::from("image"),
        source_parent_field: "listing_id".into(),
        target_parent_field: "listing_id".into(),
        source_order: vec!["display_order".into(), "id".into()],
        target_order: vec!["display_order".into(), "legacy_id".into()],
        fields: vec!["url".into()],
    })
}

fn product_schema() -> EntitySchema {
    EntitySchema::new(
        "product",
        SourceTable::query(
            "SELECT p.*, s.user_id AS owner_id FROM b2c_products p JOIN b2c_stores s ON s.id = p.storefront_id",
            "id",
        )
        .reading(&["b2c_products", "b2c_stores"]),
        TargetTable::new("listings")
            .discriminated_by("source_type", "b2c")
            .with_secondary_id("uuid"),
    )
    .required_field("owner_id", "user_id", Integer)
    .required_field("name", "title", Text)
    .field("description", "description", Text)
    .field_or("price", "price", Decimal, zero_price())
    .field_or("stock_quantity", "quantity", Integer, FieldValue::Integer(0))
    .field("created_at", "created_at", Timestamp)
    .field("updated_at", "updated_at", Timestamp)
    .enum_mapping(
        EnumMapping::new("stock_status", "status")
            .map("in_stock", "active")
            .map("low_stock", "active")
            .map("out_of_stock", "inactive")
            .fallback("inactive")
            .lossy(),
    )
    .aggregate("attributes", &[("sku", Text, "sku"), ("barcode", Text, "barcode")])
    .default_value("currency", Text, FieldValue::text(DEFAULT_CURRENCY))
    .default_value("visibility", Text, FieldValue::text(DEFAULT_VISIBILITY))
    .default_value("views_count", Integer, FieldValue::Integer(0))
    .default_value("favorites_count", Integer, FieldValue::Integer(0))
    .foreign_key("category_id", "category_id", "category")
    .foreign_key("storefront_id", "storefront_id", "storefront")
    .listing_rules()
}

fn image_schema() -> EntitySchema {
    EntitySchema::new(
        "image",
        SourceTable::table("c2c_images", "id"),
        TargetTable::new("listing_images"),
    )
    .coalesce(&["public_url", "file_path"], "url", Text)
    .field("file_path", "storage_path", Text)
    .field_or("display_order", "display_order", Integer, FieldValue::Integer(0))
    .field_or("is_main", "is_primary", Boolean, FieldValue::Boolean(false))
    .field("file_size", "file_size", Integer)
    .field("content_type", "mime_type", Text)
    .field("created_at", "created_at", Timestamp)
    .foreign_key("listing_id", "listing_id", "listing")
    .require(RequiredRule::NotBlank("url".into()))
    .require(RequiredRule::NotNull("listing_id".into()))
    .not_in_future("created_at")
    .compare(Comparison::Exact("url".into()))
}

fn zero_price() -> FieldValue {
    FieldValue::Decimal(BigDecimal::from(0))
}

/// Rules shared by every row of the unified `listings` table.
trait ListingRules {
    fn listing_rules(self) -> Self;
}

impl ListingRules for EntitySchema {
    fn listing_rules(self) -> Self {
        self.require(RequiredRule::NotBlank("title".into()))
            .require(RequiredRule::NonNegative("price".into()))
            .require(RequiredRule::NotNull("category_id".into()))
            .require(RequiredRule::NotNull("user_id".into()))
            .require(RequiredRule::NotNull("uuid".into()))
            .geo("latitude", "longitude")
            .not_in_future("created_at")
            .not_in_future("updated_at")
            .compare(Comparison::Exact("title".into()))
            .compare(Comparison::Numeric("price".into()))
            .compare(Comparison::Exact("status".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_waves() {
        let catalog = listings_catalog().unwrap();
        let waves: Vec<Vec<&str>> = catalog
            .dependency_waves()
            .iter()
            .map(|wave| wave.iter().map(|s| s.entity_type.as_str()).collect())
            .collect();

        assert_eq!(
            waves,
            vec![
                vec!["category", "storefront"],
                vec!["listing", "product"],
                vec!["image"],
            ]
        );
    }

    #[test]
    fn test_only_stock_status_is_lossy() {
        let catalog = listings_catalog().unwrap();
        let lossy: Vec<(&str, &str)> = catalog
            .schemas()
            .iter()
            .flat_map(|schema| {
                schema
                    .lossy_enums()
                    .map(move |mapping| (schema.entity_type.as_str(), mapping.source.as_str()))
            })
            .collect();
        assert_eq!(lossy, vec![("product", "stock_status")]);
    }

    #[test]
    fn test_every_source_relation_names_its_tables() {
        let catalog = listings_catalog().unwrap();
        for schema in catalog.schemas() {
            assert!(!schema.source.tables.is_empty(), "{}", schema.entity_type);
        }
        let product = catalog.require(&EntityType::from("product")).unwrap();
        assert_eq!(product.source.tables, vec!["b2c_products", "b2c_stores"]);
    }

    #[test]
    fn test_listing_carries_location_columns() {
        let catalog = listings_catalog().unwrap();
        let listing = catalog.require(&EntityType::from("listing")).unwrap();

        for column in ["show_on_map", "has_individual_location", "individual_address"] {
            assert!(listing.target_type(column).is_some(), "{}", column);
        }
        assert_eq!(listing.target_type("location_privacy"), Some(Text));
        let stamped: Vec<&str> = listing
            .fields
            .iter()
            .filter(|field| field.now_when_null)
            .map(|field| field.target.as_str())
            .collect();
        assert_eq!(stamped, vec!["created_at", "updated_at"]);
    }

    #[test]
    fn test_listing_and_product_share_conflict_key_shape() {
        let catalog = listings_catalog().unwrap();
        let listing = catalog.require(&EntityType::from("listing")).unwrap();
        let product = catalog.require(&EntityType::from("product")).unwrap();
        assert_eq!(listing.target.table, product.target.table);
        assert_eq!(
            listing.target.conflict_columns(),
            product.target.conflict_columns()
        );
        assert_ne!(listing.target.discriminator, product.target.discriminator);
    }
}
