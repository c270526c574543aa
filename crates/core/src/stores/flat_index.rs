use crate::embeddings::cosine_distance;
use crate::traits::VectorIndex;
use crate::{IndexStats, MetadataFilter, RetrievalError, VectorEntry, VectorMatch};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

pub struct InMemoryVectorIndex {
    collection: String,
    entries: RwLock<BTreeMap<String, VectorEntry>>,
}

impl InMemoryVectorIndex {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

fn metadata_matches(entry: &VectorEntry, filter: Option<&MetadataFilter>) -> bool {
    filter.map_or(true, |filter| {
        filter.iter().all(|(key, expected)| {
            entry.metadata.get(key).and_then(Value::as_str) == Some(expected.as_str())
        })
    })
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>, RetrievalError> {
        let entries = self.entries.read().await;
        let mut matches: Vec<VectorMatch> = entries
            .values()
            .filter(|entry| metadata_matches(entry, filter))
            .map(|entry| VectorMatch {
                id: entry.id.clone(),
                document: entry.document.clone(),
                metadata: entry.metadata.clone(),
                distance: cosine_distance(embedding, &entry.embedding),
            })
            .collect();

        matches.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        matches.truncate(n_results);
        Ok(matches)
    }

    async fn add(&self, entries: &[VectorEntry]) -> Result<(), RetrievalError> {
        let mut stored = self.entries.write().await;
        for entry in entries {
            stored.insert(entry.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn update(&self, entry: VectorEntry) -> Result<(), RetrievalError> {
        self.entries.write().await.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, RetrievalError> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn stats(&self) -> Result<IndexStats, RetrievalError> {
        Ok(IndexStats {
            total_documents: self.entries.read().await.len(),
            collection_name: self.collection.clone(),
            backend: "memory".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::testing::vector_entry;

    #[tokio::test]
    async fn nearest_first_with_metadata_filter() -> Result<(), RetrievalError> {
        let embedder = CharacterNgramEmbedder::new(64);
        let index = InMemoryVectorIndex::new("legal_documents");
        index
            .add(&[
                vector_entry(&embedder, "1", "Lease", "tenant lease renewal"),
                vector_entry(&embedder, "2", "Merger", "corporate merger approval"),
            ])
            .await?;

        let query = embedder.embed_text("lease renewal for tenant");
        let matches = index.search(&query, 2, None).await?;
        assert_eq!(matches[0].id, "1");
        assert!(matches[0].distance <= matches[1].distance);

        let mut filter = MetadataFilter::new();
        filter.insert("title".to_string(), "Merger".to_string());
        let filtered = index.search(&query, 2, Some(&filter)).await?;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "2");
        Ok(())
    }

    #[tokio::test]
    async fn add_and_update_replace_existing_ids() -> Result<(), RetrievalError> {
        let embedder = CharacterNgramEmbedder::new(16);
        let index = InMemoryVectorIndex::new("legal_documents");
        index.add(&[vector_entry(&embedder, "1", "Lease", "v1")]).await?;
        index.add(&[vector_entry(&embedder, "1", "Lease", "v2")]).await?;
        let matches = index.search(&embedder.embed_text("v2"), 1, None).await?;
        assert_eq!(matches[0].document, "v2");
        assert_eq!(index.stats().await?.total_documents, 1);

        index.update(vector_entry(&embedder, "1", "Lease", "v3")).await?;
        let matches = index.search(&embedder.embed_text("v3"), 1, None).await?;
        assert_eq!(matches[0].document, "v3");

        assert_eq!(index.stats().await?.total_documents, 1);
        assert!(index.delete("1").await?);
        assert_eq!(index.stats().await?.total_documents, 0);
        Ok(())
    }
}
