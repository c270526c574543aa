use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub type Metadata = BTreeMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegalDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub document_type: String,
    pub category: Option<String>,
    pub source: Option<String>,
    pub author: Option<String>,
    pub date_published: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LegalDocument {
    /// Metadata attached to the document's vector index entry.
    pub fn index_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), Value::from(self.title.clone()));
        metadata.insert(
            "document_type".to_string(),
            Value::from(self.document_type.clone()),
        );
        if let Some(category) = &self.category {
            metadata.insert("category".to_string(), Value::from(category.clone()));
        }
        if let Some(source) = &self.source {
            metadata.insert("source".to_string(), Value::from(source.clone()));
        }
        metadata
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    pub document_type: String,
    pub category: Option<String>,
    pub source: Option<String>,
    pub author: Option<String>,
    pub date_published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewDocument {
    pub fn into_document(self, id: String, now: DateTime<Utc>) -> LegalDocument {
        LegalDocument {
            id,
            title: self.title,
            content: self.content,
            document_type: self.document_type,
            category: self.category,
            source: self.source,
            author: self.author,
            date_published: self.date_published,
            date_created: now,
            date_updated: now,
            metadata: self.metadata,
            tags: self.tags,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub document_type: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub author: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl DocumentUpdate {
    pub fn apply(self, document: &mut LegalDocument, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            document.title = title;
        }
        if let Some(content) = self.content {
            document.content = content;
        }
        if let Some(document_type) = self.document_type {
            document.document_type = document_type;
        }
        if let Some(category) = self.category {
            document.category = Some(category);
        }
        if let Some(source) = self.source {
            document.source = Some(source);
        }
        if let Some(author) = self.author {
            document.author = Some(author);
        }
        if let Some(tags) = self.tags {
            document.tags = tags;
        }
        document.date_updated = now;
    }

    pub fn touches_indexed_fields(&self) -> bool {
        self.title.is_some()
            || self.content.is_some()
            || self.document_type.is_some()
            || self.category.is_some()
            || self.source.is_some()
    }
}

/// Conjunctive document filters. An empty list means "no constraint".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DocumentFilters {
    pub document_types: Vec<String>,
    pub categories: Vec<String>,
}

impl DocumentFilters {
    pub fn matches(&self, document: &LegalDocument) -> bool {
        let type_ok = self.document_types.is_empty()
            || self.document_types.iter().any(|kind| kind == &document.document_type);
        let category_ok = self.categories.is_empty()
            || document
                .category
                .as_ref()
                .is_some_and(|category| self.categories.contains(category));
        type_ok && category_ok
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SearchType {
    #[serde(rename = "postgres")]
    Lexical,
    #[serde(rename = "vector")]
    Vector,
    #[serde(rename = "hybrid")]
    Hybrid,
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchType::Lexical => write!(f, "postgres"),
            SearchType::Vector => write!(f, "vector"),
            SearchType::Hybrid => write!(f, "hybrid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub content: String,
    pub document_type: String,
    pub category: String,
    pub source: String,
    pub score: f64,
    pub search_type: SearchType,
}

impl Candidate {
    pub fn from_document(document: LegalDocument, score: f64, search_type: SearchType) -> Self {
        Self {
            id: document.id,
            title: document.title,
            content: document.content,
            document_type: document.document_type,
            category: document.category.unwrap_or_default(),
            source: document.source.unwrap_or_default(),
            score,
            search_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedCandidate {
    pub candidate: Candidate,
    pub combined_score: f64,
    /// Vector-branch score, set when the id was also found lexically.
    pub vector_score: Option<f64>,
}

impl FusedCandidate {
    pub fn id(&self) -> &str {
        &self.candidate.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankedCandidate {
    pub fused: FusedCandidate,
    /// `None` when the rerank stage failed and fused order was kept.
    pub rerank_score: Option<f64>,
}

impl RerankedCandidate {
    pub fn id(&self) -> &str {
        self.fused.id()
    }

    /// First finite score of rerank, combined, then stage score.
    pub fn relevance_score(&self) -> f64 {
        self.rerank_score
            .filter(|score| score.is_finite())
            .or_else(|| Some(self.fused.combined_score).filter(|score| score.is_finite()))
            .or_else(|| Some(self.fused.candidate.score).filter(|score| score.is_finite()))
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalResult {
    pub rank: usize,
    pub id: String,
    pub title: String,
    pub content_preview: String,
    pub full_content: String,
    pub document_type: String,
    pub category: String,
    pub source: String,
    pub relevance_score: f64,
    pub search_type: SearchType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RetrievalRequest {
    pub query: String,
    pub filters: DocumentFilters,
    pub limit: usize,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            filters: DocumentFilters::default(),
            limit,
        }
    }

    pub fn with_filters(mut self, filters: DocumentFilters) -> Self {
        self.filters = filters;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorEntry {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub distance: f64,
}

impl VectorMatch {
    pub fn metadata_str(&self, key: &str) -> String {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

pub type MetadataFilter = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    pub total_documents: usize,
    pub collection_name: String,
    pub backend: String,
}
