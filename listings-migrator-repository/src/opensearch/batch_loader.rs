//! OpenSearch implementation of the batch loader.
//!
//! Each batch becomes one `_bulk` request of `update` actions with
//! `doc_as_upsert`, keyed by the record's secondary id. A bulk request is not
//! transactional, but replaying it yields the same documents, which is what the
//! checkpoint protocol needs.

use async_trait::async_trait;
use listings_migrator_shared::{EntitySchema, LoadedId, TransformedRecord};
use opensearch::{
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    BulkParts, OpenSearch,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::LoadError;
use crate::interfaces::BatchLoader;

/// Maximum number of item errors quoted in a failed batch's error message.
const MAX_REPORTED_ITEM_ERRORS: usize = 5;

/// Batch loader writing transformed records as documents into an OpenSearch index.
///
/// Documents carry no numeric target id, so the returned identifier for each
/// record is its source id: dependents indexed later keep referencing parents by
/// source id.
pub struct OpenSearchBatchLoader {
    client: OpenSearch,
    index: String,
}

impl OpenSearchBatchLoader {
    /// Create a new loader connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index` - Index (or alias) receiving the documents
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchBatchLoader)` - A new loader instance
    /// * `Err(LoadError)` - If the URL is invalid or the transport cannot be built
    pub async fn new(url: &str, index: impl Into<String>) -> Result<Self, LoadError> {
        let parsed_url = Url::parse(url).map_err(|e| LoadError::TargetUnavailable(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| LoadError::TargetUnavailable(e.to_string()))?;

        let client = OpenSearch::new(transport);
        let index = index.into();

        info!(url = %url, index = %index, "Created OpenSearch batch loader");

        Ok(Self { client, index })
    }

    /// Check the cluster answers before the run starts.
    pub async fn ping(&self) -> Result<(), LoadError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| LoadError::TargetUnavailable(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(LoadError::TargetUnavailable(format!(
                "Ping failed with status {}",
                status
            )));
        }
        Ok(())
    }

    /// Document id: the secondary id when present, `{entity_type}:{source_id}` otherwise.
    fn document_id(record: &TransformedRecord) -> String {
        match record.secondary_id {
            Some(id) => id.to_string(),
            None => format!("{}:{}", record.entity_type, record.source_id),
        }
    }

    fn document(record: &TransformedRecord) -> Value {
        let mut doc = Map::new();
        for field in &record.fields {
            doc.insert(field.name.clone(), field.value.to_json());
        }
        doc.insert("entity_type".to_string(), json!(record.entity_type.as_str()));
        Value::Object(doc)
    }

    fn bulk_body(&self, records: &[TransformedRecord]) -> Vec<JsonBody<Value>> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(records.len() * 2);
        for record in records {
            body.push(
                json!({
                    "update": { "_index": self.index, "_id": Self::document_id(record) }
                })
                .into(),
            );
            body.push(
                json!({
                    "doc": Self::document(record),
                    "doc_as_upsert": true
                })
                .into(),
            );
        }
        body
    }

    /// Collects per-item error reasons from a bulk response.
    fn item_errors(response: &Value) -> Vec<String> {
        response["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let result = &item["update"];
                        result.get("error").map(|error| {
                            format!(
                                "{}: {}",
                                result["_id"].as_str().unwrap_or("?"),
                                error["reason"].as_str().unwrap_or("unknown error")
                            )
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl BatchLoader for OpenSearchBatchLoader {
    async fn load_batch(
        &self,
        schema: &EntitySchema,
        records: &[TransformedRecord],
    ) -> Result<Vec<LoadedId>, LoadError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .bulk(BulkParts::Index(&self.index))
            .body(self.bulk_body(records))
            .send()
            .await
            .map_err(|e| LoadError::TargetUnavailable(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(LoadError::index(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LoadError::index(e.to_string()))?;

        if body["errors"].as_bool().unwrap_or(false) {
            let errors = Self::item_errors(&body);
            return Err(LoadError::index(format!(
                "{} of {} documents failed for {}: {}",
                errors.len(),
                records.len(),
                schema.entity_type,
                errors
                    .iter()
                    .take(MAX_REPORTED_ITEM_ERRORS)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("; ")
            )));
        }

        debug!(
            entity_type = %schema.entity_type,
            index = %self.index,
            documents = records.len(),
            "Bulk upsert succeeded"
        );

        Ok(records
            .iter()
            .map(|record| LoadedId::new(record.source_id, record.source_id))
            .collect())
    }

    fn keeps_source_ids(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listings_migrator_shared::{EntityType, FieldValue, SemanticType, TargetField};
    use uuid::Uuid;

    fn record(secondary_id: Option<Uuid>) -> TransformedRecord {
        TransformedRecord {
            entity_type: EntityType::from("listing"),
            source_id: 7,
            target_table: "listings".to_string(),
            secondary_id,
            fields: vec![TargetField {
                name: "title".to_string(),
                ty: SemanticType::Text,
                value: FieldValue::text("Bike"),
            }],
        }
    }

    #[test]
    fn test_document_id_prefers_secondary_id() {
        let id = Uuid::new_v4();
        assert_eq!(OpenSearchBatchLoader::document_id(&record(Some(id))), id.to_string());
        assert_eq!(OpenSearchBatchLoader::document_id(&record(None)), "listing:7");
    }

    #[test]
    fn test_document_includes_entity_type() {
        let doc = OpenSearchBatchLoader::document(&record(None));
        assert_eq!(doc["title"], json!("Bike"));
        assert_eq!(doc["entity_type"], json!("listing"));
    }

    #[test]
    fn test_item_errors_are_collected() {
        let response = json!({
            "errors": true,
            "items": [
                { "update": { "_id": "a", "status": 200 } },
                { "update": { "_id": "b", "status": 400, "error": { "reason": "mapper_parsing_exception" } } }
            ]
        });
        assert_eq!(
            OpenSearchBatchLoader::item_errors(&response),
            vec!["b: mapper_parsing_exception".to_string()]
        );
    }
}
