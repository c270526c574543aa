use crate::traits::DocumentStore;
use crate::{Candidate, DocumentFilters, ErrorKind, RetrievalError, SearchType};
use std::sync::Arc;
use tracing::info;

/// Substring matches carry no ranking signal, so every hit scores the same.
pub const LEXICAL_SCORE: f64 = 1.0;

pub struct LexicalSearchAdapter {
    store: Arc<dyn DocumentStore>,
}

impl LexicalSearchAdapter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn search(
        &self,
        query: &str,
        filters: &DocumentFilters,
        limit: usize,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        let documents = self
            .store
            .search(query, filters, limit, 0)
            .await
            .map_err(|error| error.classify(ErrorKind::StoreUnavailable))?;

        let candidates: Vec<Candidate> = documents
            .into_iter()
            .take(limit)
            .map(|document| Candidate::from_document(document, LEXICAL_SCORE, SearchType::Lexical))
            .collect();

        info!(count = candidates.len(), "lexical search finished");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryDocumentStore;
    use crate::testing::{new_document, FailingStore};

    #[tokio::test]
    async fn matches_score_flat_and_respect_filters() -> Result<(), RetrievalError> {
        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .insert_all(vec![
                new_document(
                    "Lease Agreement",
                    "tenant pays rent monthly",
                    "contract",
                    "real_estate",
                ),
                new_document(
                    "Labor Standards Act",
                    "rent-seeking is not covered",
                    "statute",
                    "labor",
                ),
                new_document("Sales Contract", "delivery terms", "contract", "commerce"),
            ])
            .await?;

        let adapter = LexicalSearchAdapter::new(store);
        let everything = adapter.search("RENT", &DocumentFilters::default(), 10).await?;
        assert_eq!(everything.len(), 2);
        assert!(everything.iter().all(|candidate| candidate.score == LEXICAL_SCORE));
        assert!(everything
            .iter()
            .all(|candidate| candidate.search_type == SearchType::Lexical));

        let filters = DocumentFilters {
            document_types: vec!["contract".to_string()],
            categories: Vec::new(),
        };
        let contracts = adapter.search("rent", &filters, 10).await?;
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].title, "Lease Agreement");

        let none = adapter.search("arbitration", &DocumentFilters::default(), 10).await?;
        assert!(none.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn store_failure_is_classified() {
        let adapter = LexicalSearchAdapter::new(Arc::new(FailingStore));
        let error = adapter
            .search("rent", &DocumentFilters::default(), 5)
            .await
            .expect_err("failing store should error");
        assert_eq!(error.kind(), Some(ErrorKind::StoreUnavailable));
    }
}
