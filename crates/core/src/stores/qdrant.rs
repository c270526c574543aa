use crate::traits::VectorIndex;
use crate::{IndexStats, Metadata, MetadataFilter, RetrievalError, VectorEntry, VectorMatch};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

/// Qdrant collection using cosine distance. Qdrant only accepts integer or
/// UUID point ids, so document ids are mapped to UUID v5 and kept in the payload.
pub struct QdrantIndex {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantIndex {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    pub async fn ensure_collection(&self) -> Result<(), RetrievalError> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RetrievalError::IndexQueryFailure(format!(
                "qdrant collection setup failed with {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), RetrievalError> {
        if vector.len() != self.vector_size {
            return Err(RetrievalError::IndexQueryFailure(format!(
                "vector dim {} is not {}",
                vector.len(),
                self.vector_size
            )));
        }
        Ok(())
    }

    async fn upsert(&self, entries: &[VectorEntry]) -> Result<(), RetrievalError> {
        let points = entries
            .iter()
            .map(|entry| {
                self.check_dimensions(&entry.embedding)?;
                Ok(json!({
                    "id": point_id(&entry.id).to_string(),
                    "vector": entry.embedding,
                    "payload": {
                        "document_id": entry.id,
                        "document": entry.document,
                        "metadata": entry.metadata,
                    },
                }))
            })
            .collect::<Result<Vec<_>, RetrievalError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(())
    }
}

pub fn point_id(document_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, document_id.as_bytes())
}

fn backend_error(status: StatusCode) -> RetrievalError {
    RetrievalError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

fn build_filter(filter: Option<&MetadataFilter>) -> Option<Value> {
    let filter = filter.filter(|filter| !filter.is_empty())?;
    let must: Vec<Value> = filter
        .iter()
        .map(|(key, value)| {
            json!({ "key": format!("metadata.{key}"), "match": { "value": value } })
        })
        .collect();
    Some(json!({ "must": must }))
}

fn parse_hits(body: &Value) -> Vec<VectorMatch> {
    body.pointer("/result")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| {
                    let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
                    let metadata: Metadata = hit
                        .pointer("/payload/metadata")
                        .and_then(Value::as_object)
                        .map(|object| object.clone().into_iter().collect())
                        .unwrap_or_default();
                    VectorMatch {
                        id: hit
                            .pointer("/payload/document_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        document: hit
                            .pointer("/payload/document")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        metadata,
                        // Qdrant reports cosine similarity for Cosine collections.
                        distance: 1.0 - score,
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(
        &self,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>, RetrievalError> {
        self.check_dimensions(embedding)?;

        let mut body = json!({
            "vector": embedding,
            "limit": n_results,
            "with_payload": true,
        });
        if let Some(filter) = build_filter(filter) {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        Ok(parse_hits(&parsed))
    }

    async fn add(&self, entries: &[VectorEntry]) -> Result<(), RetrievalError> {
        self.upsert(entries).await
    }

    async fn update(&self, entry: VectorEntry) -> Result<(), RetrievalError> {
        self.upsert(std::slice::from_ref(&entry)).await
    }

    async fn delete(&self, id: &str) -> Result<bool, RetrievalError> {
        let point = point_id(id).to_string();
        let existing = self
            .client
            .get(format!("{}/points/{}", self.collection_url(), point))
            .send()
            .await?;
        if existing.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !existing.status().is_success() {
            return Err(backend_error(existing.status()));
        }

        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&json!({ "points": [point] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(true)
    }

    async fn stats(&self) -> Result<IndexStats, RetrievalError> {
        let response = self.client.get(self.collection_url()).send().await?;
        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        let total_documents = parsed
            .pointer("/result/points_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        Ok(IndexStats {
            total_documents,
            collection_name: self.collection.clone(),
            backend: "qdrant".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_per_document() {
        assert_eq!(point_id("42"), point_id("42"));
        assert_ne!(point_id("42"), point_id("43"));
    }

    #[test]
    fn hits_are_converted_to_distances() {
        let body = json!({
            "result": [
                {
                    "id": point_id("3").to_string(),
                    "score": 0.75,
                    "payload": {
                        "document_id": "3",
                        "document": "Lessee shall maintain insurance.",
                        "metadata": { "title": "Lease", "document_type": "contract" }
                    }
                }
            ]
        });

        let hits = parse_hits(&body);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "3");
        assert!((hits[0].distance - 0.25).abs() < 1e-12);
        assert_eq!(hits[0].metadata_str("title"), "Lease");
        assert!(parse_hits(&json!({})).is_empty());
    }

    #[test]
    fn metadata_filter_targets_payload_fields() {
        let mut filter = MetadataFilter::new();
        filter.insert("category".to_string(), "labor".to_string());
        let built = build_filter(Some(&filter)).expect("non-empty filter");
        assert_eq!(built["must"][0]["key"], "metadata.category");
        assert_eq!(built["must"][0]["match"]["value"], "labor");
        assert!(build_filter(Some(&MetadataFilter::new())).is_none());
        assert!(build_filter(None).is_none());
    }

    #[tokio::test]
    async fn mismatched_dimensions_are_rejected_before_io() {
        let index = QdrantIndex::new("http://127.0.0.1:1", "legal_documents", 4);
        let error = index
            .search(&[0.1, 0.2], 5, None)
            .await
            .expect_err("dimension mismatch");
        assert!(error.to_string().contains("vector dim 2"));
    }
}
