use crate::traits::DocumentStore;
use crate::{DocumentFilters, DocumentUpdate, LegalDocument, NewDocument, RetrievalError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

/// Document store kept in process memory. Ids are ascending integers, and
/// search results come back in id order.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<Documents>,
}

#[derive(Default)]
struct Documents {
    next_id: u64,
    by_id: BTreeMap<u64, LegalDocument>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_all(
        &self,
        documents: Vec<NewDocument>,
    ) -> Result<Vec<LegalDocument>, RetrievalError> {
        let mut created = Vec::with_capacity(documents.len());
        for document in documents {
            created.push(self.create(document).await?);
        }
        Ok(created)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn parse_id(id: &str) -> Option<u64> {
    id.trim().parse().ok()
}

fn matches_query(document: &LegalDocument, needle: &str) -> bool {
    needle.is_empty()
        || document.title.to_lowercase().contains(needle)
        || document.content.to_lowercase().contains(needle)
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn search(
        &self,
        query: &str,
        filters: &DocumentFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LegalDocument>, RetrievalError> {
        let needle = query.trim().to_lowercase();
        let documents = self.inner.read().await;

        Ok(documents
            .by_id
            .values()
            .filter(|document| matches_query(document, &needle))
            .filter(|document| filters.matches(document))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<LegalDocument>, RetrievalError> {
        let Some(key) = parse_id(id) else {
            return Ok(None);
        };
        Ok(self.inner.read().await.by_id.get(&key).cloned())
    }

    async fn create(&self, document: NewDocument) -> Result<LegalDocument, RetrievalError> {
        let mut documents = self.inner.write().await;
        documents.next_id += 1;
        let key = documents.next_id;
        let created = document.into_document(key.to_string(), Utc::now());
        documents.by_id.insert(key, created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        id: &str,
        update: DocumentUpdate,
    ) -> Result<Option<LegalDocument>, RetrievalError> {
        let Some(key) = parse_id(id) else {
            return Ok(None);
        };
        let mut documents = self.inner.write().await;
        Ok(documents.by_id.get_mut(&key).map(|document| {
            update.apply(document, Utc::now());
            document.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, RetrievalError> {
        let Some(key) = parse_id(id) else {
            return Ok(false);
        };
        Ok(self.inner.write().await.by_id.remove(&key).is_some())
    }

    async fn document_types(&self) -> Result<Vec<String>, RetrievalError> {
        let documents = self.inner.read().await;
        let types: BTreeSet<String> = documents
            .by_id
            .values()
            .map(|document| document.document_type.clone())
            .filter(|kind| !kind.is_empty())
            .collect();
        Ok(types.into_iter().collect())
    }

    async fn categories(&self) -> Result<Vec<String>, RetrievalError> {
        let documents = self.inner.read().await;
        let categories: BTreeSet<String> = documents
            .by_id
            .values()
            .filter_map(|document| document.category.clone())
            .filter(|category| !category.is_empty())
            .collect();
        Ok(categories.into_iter().collect())
    }
}
