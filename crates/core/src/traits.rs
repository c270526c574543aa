use crate::llm::{CompletionRequest, ModelInfo};
use crate::{
    DocumentFilters, DocumentUpdate, IndexStats, LegalDocument, LlmError, MetadataFilter,
    NewDocument, RetrievalError, VectorEntry, VectorMatch,
};
use async_trait::async_trait;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Case-insensitive substring match over title and content.
    async fn search(
        &self,
        query: &str,
        filters: &DocumentFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LegalDocument>, RetrievalError>;

    async fn get(&self, id: &str) -> Result<Option<LegalDocument>, RetrievalError>;

    async fn create(&self, document: NewDocument) -> Result<LegalDocument, RetrievalError>;

    async fn update(
        &self,
        id: &str,
        update: DocumentUpdate,
    ) -> Result<Option<LegalDocument>, RetrievalError>;

    async fn delete(&self, id: &str) -> Result<bool, RetrievalError>;

    async fn document_types(&self) -> Result<Vec<String>, RetrievalError>;

    async fn categories(&self) -> Result<Vec<String>, RetrievalError>;
}

/// Nearest-neighbour index. Distances are cosine distances (`1 - cos`).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(
        &self,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>, RetrievalError>;

    /// Upserts: an entry whose id is already present replaces it.
    async fn add(&self, entries: &[VectorEntry]) -> Result<(), RetrievalError>;

    async fn update(&self, entry: VectorEntry) -> Result<(), RetrievalError>;

    async fn delete(&self, id: &str) -> Result<bool, RetrievalError>;

    async fn stats(&self) -> Result<IndexStats, RetrievalError>;
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
pub trait RerankModel: Send + Sync {
    fn is_available(&self) -> bool;

    fn name(&self) -> &str;

    async fn score(&self, query: &str, document: &str) -> Result<f64, RetrievalError>;

    /// Scores are returned in `documents` order.
    async fn score_batch(
        &self,
        query: &str,
        documents: &[&str],
    ) -> Result<Vec<f64>, RetrievalError> {
        let mut scores = Vec::with_capacity(documents.len());
        for document in documents {
            scores.push(self.score(query, document).await?);
        }
        Ok(scores)
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn is_available(&self) -> bool;

    fn model_info(&self) -> ModelInfo;

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}
