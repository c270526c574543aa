use crate::traits::{EmbeddingService, VectorIndex};
use crate::{Candidate, ErrorKind, RetrievalError, SearchType, VectorMatch};
use std::sync::Arc;
use tracing::info;

/// Cosine distance to a similarity in [0, 1]. Opposite vectors (distance
/// above 1) floor at zero rather than going negative.
pub fn similarity_from_distance(distance: f64) -> f64 {
    if !distance.is_finite() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

pub struct VectorSearchAdapter {
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
}

impl VectorSearchAdapter {
    pub fn new(embedder: Arc<dyn EmbeddingService>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|error| error.classify(ErrorKind::EmbeddingFailure))?;

        let matches = self
            .index
            .search(&embedding, limit, None)
            .await
            .map_err(|error| error.classify(ErrorKind::IndexQueryFailure))?;

        let candidates: Vec<Candidate> = matches
            .into_iter()
            .take(limit)
            .map(into_candidate)
            .collect();
        info!(count = candidates.len(), "vector search finished");
        Ok(candidates)
    }
}

fn into_candidate(matched: VectorMatch) -> Candidate {
    Candidate {
        title: matched.metadata_str("title"),
        document_type: matched.metadata_str("document_type"),
        category: matched.metadata_str("category"),
        source: matched.metadata_str("source"),
        score: similarity_from_distance(matched.distance),
        search_type: SearchType::Vector,
        id: matched.id,
        content: matched.document,
    }
}
