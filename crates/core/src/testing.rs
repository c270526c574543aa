use crate::embeddings::CharacterNgramEmbedder;
use crate::llm::{CompletionRequest, ModelInfo};
use crate::stores::InMemoryDocumentStore;
use crate::traits::{DocumentStore, EmbeddingService, LlmClient, RerankModel, VectorIndex};
use crate::{
    Candidate, DocumentFilters, DocumentUpdate, FusedCandidate, IndexStats, LegalDocument,
    LlmError, Metadata, MetadataFilter, NewDocument, RetrievalError, SearchType, VectorEntry,
    VectorMatch,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn new_document(
    title: &str,
    content: &str,
    document_type: &str,
    category: &str,
) -> NewDocument {
    NewDocument {
        title: title.to_string(),
        content: content.to_string(),
        document_type: document_type.to_string(),
        category: Some(category.to_string()),
        ..NewDocument::default()
    }
}

pub fn candidate(id: &str, score: f64, search_type: SearchType) -> Candidate {
    Candidate {
        id: id.to_string(),
        title: format!("title {id}"),
        content: format!("content {id}"),
        document_type: "contract".to_string(),
        category: String::new(),
        source: String::new(),
        score,
        search_type,
    }
}

pub fn fused(id: &str, combined_score: f64, content: &str) -> FusedCandidate {
    let mut candidate = candidate(id, combined_score, SearchType::Vector);
    candidate.content = content.to_string();
    FusedCandidate {
        candidate,
        combined_score,
        vector_score: None,
    }
}

pub fn vector_entry(
    embedder: &CharacterNgramEmbedder,
    id: &str,
    title: &str,
    document: &str,
) -> VectorEntry {
    let mut metadata = Metadata::new();
    metadata.insert("title".to_string(), Value::from(title));
    VectorEntry {
        id: id.to_string(),
        document: document.to_string(),
        embedding: embedder.embed_text(document),
        metadata,
    }
}

fn offline(backend: &str) -> RetrievalError {
    RetrievalError::BackendResponse {
        backend: backend.to_string(),
        details: "503 Service Unavailable".to_string(),
    }
}

pub struct FailingStore;

#[async_trait]
impl DocumentStore for FailingStore {
    async fn search(
        &self,
        _query: &str,
        _filters: &DocumentFilters,
        _limit: usize,
        _offset: usize,
    ) -> Result<Vec<LegalDocument>, RetrievalError> {
        Err(offline("store"))
    }

    async fn get(&self, _id: &str) -> Result<Option<LegalDocument>, RetrievalError> {
        Err(offline("store"))
    }

    async fn create(&self, _document: NewDocument) -> Result<LegalDocument, RetrievalError> {
        Err(offline("store"))
    }

    async fn update(
        &self,
        _id: &str,
        _update: DocumentUpdate,
    ) -> Result<Option<LegalDocument>, RetrievalError> {
        Err(offline("store"))
    }

    async fn delete(&self, _id: &str) -> Result<bool, RetrievalError> {
        Err(offline("store"))
    }

    async fn document_types(&self) -> Result<Vec<String>, RetrievalError> {
        Err(offline("store"))
    }

    async fn categories(&self) -> Result<Vec<String>, RetrievalError> {
        Err(offline("store"))
    }
}

/// Returns the same documents for every query, in the given order.
pub struct ScriptedStore {
    documents: Vec<LegalDocument>,
}

impl ScriptedStore {
    /// Each pair becomes a contract whose id and title are the first element.
    pub fn with_titles(entries: &[(&str, &str)]) -> Self {
        let now = Utc::now();
        let documents = entries
            .iter()
            .map(|(id, content)| {
                NewDocument {
                    title: id.to_string(),
                    content: content.to_string(),
                    document_type: "contract".to_string(),
                    ..NewDocument::default()
                }
                .into_document(id.to_string(), now)
            })
            .collect();
        Self { documents }
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn search(
        &self,
        _query: &str,
        _filters: &DocumentFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LegalDocument>, RetrievalError> {
        Ok(self.documents.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<LegalDocument>, RetrievalError> {
        Ok(self.documents.iter().find(|document| document.id == id).cloned())
    }

    async fn create(&self, _document: NewDocument) -> Result<LegalDocument, RetrievalError> {
        Err(RetrievalError::StoreUnavailable("scripted store is read-only".to_string()))
    }

    async fn update(
        &self,
        _id: &str,
        _update: DocumentUpdate,
    ) -> Result<Option<LegalDocument>, RetrievalError> {
        Ok(None)
    }

    async fn delete(&self, _id: &str) -> Result<bool, RetrievalError> {
        Ok(false)
    }

    async fn document_types(&self) -> Result<Vec<String>, RetrievalError> {
        Ok(vec!["contract".to_string()])
    }

    async fn categories(&self) -> Result<Vec<String>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// Sleeps before answering every search with nothing.
pub struct SlowStore(pub Duration);

#[async_trait]
impl DocumentStore for SlowStore {
    async fn search(
        &self,
        _query: &str,
        _filters: &DocumentFilters,
        _limit: usize,
        _offset: usize,
    ) -> Result<Vec<LegalDocument>, RetrievalError> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }

    async fn get(&self, _id: &str) -> Result<Option<LegalDocument>, RetrievalError> {
        Ok(None)
    }

    async fn create(&self, _document: NewDocument) -> Result<LegalDocument, RetrievalError> {
        Err(offline("slow store"))
    }

    async fn update(
        &self,
        _id: &str,
        _update: DocumentUpdate,
    ) -> Result<Option<LegalDocument>, RetrievalError> {
        Ok(None)
    }

    async fn delete(&self, _id: &str) -> Result<bool, RetrievalError> {
        Ok(false)
    }

    async fn document_types(&self) -> Result<Vec<String>, RetrievalError> {
        Ok(Vec::new())
    }

    async fn categories(&self) -> Result<Vec<String>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// In-memory store that fails every `create` after the first `quota`.
pub struct CreateQuotaStore {
    inner: InMemoryDocumentStore,
    remaining: AtomicUsize,
}

impl CreateQuotaStore {
    pub fn accepting(quota: usize) -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            remaining: AtomicUsize::new(quota),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl DocumentStore for CreateQuotaStore {
    async fn search(
        &self,
        query: &str,
        filters: &DocumentFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LegalDocument>, RetrievalError> {
        self.inner.search(query, filters, limit, offset).await
    }

    async fn get(&self, id: &str) -> Result<Option<LegalDocument>, RetrievalError> {
        self.inner.get(id).await
    }

    async fn create(&self, document: NewDocument) -> Result<LegalDocument, RetrievalError> {
        let accepted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !accepted {
            return Err(offline("quota store"));
        }
        self.inner.create(document).await
    }

    async fn update(
        &self,
        id: &str,
        update: DocumentUpdate,
    ) -> Result<Option<LegalDocument>, RetrievalError> {
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: &str) -> Result<bool, RetrievalError> {
        self.inner.delete(id).await
    }

    async fn document_types(&self) -> Result<Vec<String>, RetrievalError> {
        self.inner.document_types().await
    }

    async fn categories(&self) -> Result<Vec<String>, RetrievalError> {
        self.inner.categories().await
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingService for FailingEmbedder {
    fn dimensions(&self) -> usize {
        4
    }

    fn name(&self) -> &str {
        "failing-embedder"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        Err(offline("embedder"))
    }
}

/// Embeds every text to the same unit vector.
pub struct FixedEmbedder;

#[async_trait]
impl EmbeddingService for FixedEmbedder {
    fn dimensions(&self) -> usize {
        4
    }

    fn name(&self) -> &str {
        "fixed-embedder"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }
}

pub struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn search(
        &self,
        _embedding: &[f32],
        _n_results: usize,
        _filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>, RetrievalError> {
        Err(offline("index"))
    }

    async fn add(&self, _entries: &[VectorEntry]) -> Result<(), RetrievalError> {
        Err(offline("index"))
    }

    async fn update(&self, _entry: VectorEntry) -> Result<(), RetrievalError> {
        Err(offline("index"))
    }

    async fn delete(&self, _id: &str) -> Result<bool, RetrievalError> {
        Err(offline("index"))
    }

    async fn stats(&self) -> Result<IndexStats, RetrievalError> {
        Err(offline("index"))
    }
}

/// Answers every search with the given matches, truncated to `n_results`.
pub struct ScriptedIndex {
    matches: Vec<VectorMatch>,
}

impl ScriptedIndex {
    pub fn new(matches: Vec<VectorMatch>) -> Self {
        Self { matches }
    }
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn search(
        &self,
        _embedding: &[f32],
        n_results: usize,
        _filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>, RetrievalError> {
        Ok(self.matches.iter().take(n_results).cloned().collect())
    }

    async fn add(&self, _entries: &[VectorEntry]) -> Result<(), RetrievalError> {
        Ok(())
    }

    async fn update(&self, _entry: VectorEntry) -> Result<(), RetrievalError> {
        Ok(())
    }

    async fn delete(&self, _id: &str) -> Result<bool, RetrievalError> {
        Ok(false)
    }

    async fn stats(&self) -> Result<IndexStats, RetrievalError> {
        Ok(IndexStats {
            total_documents: self.matches.len(),
            collection_name: "scripted".to_string(),
            backend: "scripted".to_string(),
        })
    }
}

/// Reports itself available, then fails every scoring call.
pub struct FailingRerankModel;

#[async_trait]
impl RerankModel for FailingRerankModel {
    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "failing-reranker"
    }

    async fn score(&self, _query: &str, _document: &str) -> Result<f64, RetrievalError> {
        Err(offline("reranker"))
    }
}

pub struct UnavailableRerankModel;

#[async_trait]
impl RerankModel for UnavailableRerankModel {
    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "unavailable-reranker"
    }

    async fn score(&self, _query: &str, _document: &str) -> Result<f64, RetrievalError> {
        Err(RetrievalError::RerankFailure("model not loaded".to_string()))
    }
}

/// Scores a document by how often the query occurs in it.
pub struct KeywordRerankModel;

#[async_trait]
impl RerankModel for KeywordRerankModel {
    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "keyword-reranker"
    }

    async fn score(&self, query: &str, document: &str) -> Result<f64, RetrievalError> {
        Ok(document.matches(query).count() as f64)
    }
}

/// Like `KeywordRerankModel`, but scores NaN for any document mentioning "garbled".
pub struct NanRerankModel;

#[async_trait]
impl RerankModel for NanRerankModel {
    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "nan-reranker"
    }

    async fn score(&self, query: &str, document: &str) -> Result<f64, RetrievalError> {
        if document.contains("garbled") {
            return Ok(f64::NAN);
        }
        Ok(document.matches(query).count() as f64)
    }
}

/// Returns one score fewer than it was given documents.
pub struct ShortRerankModel;

#[async_trait]
impl RerankModel for ShortRerankModel {
    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "short-reranker"
    }

    async fn score(&self, _query: &str, _document: &str) -> Result<f64, RetrievalError> {
        Ok(0.5)
    }

    async fn score_batch(
        &self,
        _query: &str,
        documents: &[&str],
    ) -> Result<Vec<f64>, RetrievalError> {
        Ok(vec![0.5; documents.len().saturating_sub(1)])
    }
}

/// Replies with canned answers in order and records every user message.
pub struct ScriptedLlm {
    provider: String,
    available: bool,
    responses: Mutex<VecDeque<String>>,
    user_messages: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn named(provider: &str, responses: &[&str]) -> Self {
        Self {
            provider: provider.to_string(),
            available: true,
            responses: Mutex::new(responses.iter().map(|response| response.to_string()).collect()),
            user_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn offline(provider: &str) -> Self {
        Self {
            available: false,
            ..Self::named(provider, &[])
        }
    }

    pub fn user_messages(&self) -> Vec<String> {
        self.user_messages.lock().expect("lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn is_available(&self) -> bool {
        self.available
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.provider.clone(),
            model: "scripted".to_string(),
            max_tokens: 4096,
            temperature: 0.1,
            available: self.available,
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        if !self.available {
            return Err(LlmError::Unavailable {
                provider: self.provider.clone(),
            });
        }

        if let Some(text) = request.user_text() {
            self.user_messages.lock().expect("lock").push(text.to_string());
        }
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or_else(|| LlmError::BackendResponse {
                provider: self.provider.clone(),
                details: "no scripted response left".to_string(),
            })
    }
}
