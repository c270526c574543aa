use crate::traits::DocumentStore;
use crate::{DocumentFilters, DocumentUpdate, LegalDocument, NewDocument, RetrievalError};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct OpenSearchDocumentStore {
    client: Arc<Client>,
    endpoint: String,
    index_name: String,
}

impl OpenSearchDocumentStore {
    pub fn new(endpoint: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            client: Arc::new(Client::new()),
            endpoint: endpoint.into(),
            index_name: index_name.into(),
        }
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.index_name)
    }

    pub async fn ensure_index(&self) -> Result<(), RetrievalError> {
        let response = self.client.head(self.index_url()).send().await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }

        if !response.status().is_client_error() {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(self.index_url())
            .json(&json!({
                "settings": {
                    "number_of_shards": 1,
                    "number_of_replicas": 0
                },
                "mappings": {
                    "properties": {
                        "title": {"type": "keyword"},
                        "content": {"type": "wildcard"},
                        "document_type": {"type": "keyword"},
                        "category": {"type": "keyword"},
                        "source": {"type": "keyword"},
                        "author": {"type": "keyword"},
                        "date_published": {"type": "date"},
                        "date_created": {"type": "date"},
                        "date_updated": {"type": "date"},
                        "tags": {"type": "keyword"},
                        "metadata": {"type": "object", "enabled": false}
                    }
                }
            }))
            .send()
            .await?;

        if response.status().is_server_error() || response.status().is_client_error() {
            return Err(RetrievalError::StoreUnavailable(format!(
                "open-search index setup failed with {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn put_document(&self, document: &LegalDocument) -> Result<(), RetrievalError> {
        let response = self
            .client
            .put(format!("{}/_doc/{}?refresh=true", self.index_url(), document.id))
            .json(&to_source(document))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(())
    }

    async fn distinct_values(&self, field: &str) -> Result<Vec<String>, RetrievalError> {
        let response = self
            .client
            .post(format!("{}/_search", self.index_url()))
            .json(&json!({
                "size": 0,
                "aggs": { "values": { "terms": { "field": field, "size": 1000 } } }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let body: Value = response.json().await?;
        let mut values: Vec<String> = body
            .pointer("/aggregations/values/buckets")
            .and_then(Value::as_array)
            .map(|buckets| {
                buckets
                    .iter()
                    .filter_map(|bucket| bucket.pointer("/key").and_then(Value::as_str))
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        values.sort();
        Ok(values)
    }
}

fn backend_error(status: StatusCode) -> RetrievalError {
    RetrievalError::BackendResponse {
        backend: "opensearch".to_string(),
        details: status.to_string(),
    }
}

fn to_source(document: &LegalDocument) -> Value {
    json!({
        "title": document.title,
        "content": document.content,
        "document_type": document.document_type,
        "category": document.category,
        "source": document.source,
        "author": document.author,
        "date_published": document.date_published,
        "date_created": document.date_created,
        "date_updated": document.date_updated,
        "tags": document.tags,
        "metadata": document.metadata,
    })
}

fn from_hit(hit: &Value) -> Result<LegalDocument, RetrievalError> {
    let id = hit
        .pointer("/_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let mut source = hit.pointer("/_source").cloned().unwrap_or(Value::Null);
    if let Value::Object(fields) = &mut source {
        fields.insert("id".to_string(), Value::from(id));
    }
    Ok(serde_json::from_value(source)?)
}

fn escape_wildcard(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub(crate) fn build_search_body(
    query: &str,
    filters: &DocumentFilters,
    limit: usize,
    offset: usize,
) -> Value {
    let mut must = Vec::new();
    let trimmed = query.trim();
    if !trimmed.is_empty() {
        let pattern = format!("*{}*", escape_wildcard(trimmed));
        must.push(json!({
            "bool": {
                "should": [
                    {"wildcard": {"title": {"value": pattern, "case_insensitive": true}}},
                    {"wildcard": {"content": {"value": pattern, "case_insensitive": true}}}
                ],
                "minimum_should_match": 1
            }
        }));
    }

    let mut filter = Vec::new();
    if !filters.document_types.is_empty() {
        filter.push(json!({"terms": {"document_type": filters.document_types}}));
    }
    if !filters.categories.is_empty() {
        filter.push(json!({"terms": {"category": filters.categories}}));
    }

    json!({
        "from": offset,
        "size": limit,
        "sort": [{"date_created": "asc"}],
        "query": { "bool": { "must": must, "filter": filter } }
    })
}

#[async_trait]
impl DocumentStore for OpenSearchDocumentStore {
    async fn search(
        &self,
        query: &str,
        filters: &DocumentFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LegalDocument>, RetrievalError> {
        let response = self
            .client
            .post(format!("{}/_search", self.index_url()))
            .json(&build_search_body(query, filters, limit, offset))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let response_json: Value = response.json().await?;
        let hits = response_json
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        hits.iter().map(from_hit).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<LegalDocument>, RetrievalError> {
        let response = self
            .client
            .get(format!("{}/_doc/{}", self.index_url(), id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let body: Value = response.json().await?;
        Ok(Some(from_hit(&body)?))
    }

    async fn create(&self, document: NewDocument) -> Result<LegalDocument, RetrievalError> {
        let document = document.into_document(uuid::Uuid::new_v4().to_string(), Utc::now());
        self.put_document(&document).await?;
        Ok(document)
    }

    async fn update(
        &self,
        id: &str,
        update: DocumentUpdate,
    ) -> Result<Option<LegalDocument>, RetrievalError> {
        let Some(mut document) = self.get(id).await? else {
            return Ok(None);
        };
        update.apply(&mut document, Utc::now());
        self.put_document(&document).await?;
        Ok(Some(document))
    }

    async fn delete(&self, id: &str) -> Result<bool, RetrievalError> {
        let response = self
            .client
            .delete(format!("{}/_doc/{}?refresh=true", self.index_url(), id))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(backend_error(status)),
        }
    }

    async fn document_types(&self) -> Result<Vec<String>, RetrievalError> {
        self.distinct_values("document_type").await
    }

    async fn categories(&self) -> Result<Vec<String>, RetrievalError> {
        self.distinct_values("category").await
    }
}
