use crate::extractor::{extract_text, SourceFormat};
use crate::traits::{DocumentStore, EmbeddingService, VectorIndex};
use crate::{
    DocumentUpdate, IngestError, LegalDocument, NewDocument, RetrievalError, VectorEntry,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub document_type: String,
    pub category: Option<String>,
    pub source: Option<String>,
    pub tags: Vec<String>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            document_type: "document".to_string(),
            category: None,
            source: None,
            tags: Vec::new(),
        }
    }
}

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| SourceFormat::from_path(entry.path()).is_some())
        .map(|entry| entry.path().to_path_buf())
        .collect();

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<NewDocument>,
    pub skipped_files: Vec<SkippedFile>,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub documents: Vec<LegalDocument>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Reads every supported file under `folder`. Unreadable files and files whose
/// checksum was already seen are reported as skipped.
pub fn load_folder_best_effort(
    folder: &Path,
    options: &IngestionOptions,
) -> Result<LoadReport, IngestError> {
    let files = discover_documents(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no .txt, .md or .pdf files found in {}",
            folder.display()
        )));
    }

    let mut report = LoadReport::default();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for path in files {
        match load_document(&path, options) {
            Ok((checksum, document)) => {
                if let Some(original) = seen.get(&checksum) {
                    report.skipped_files.push(SkippedFile {
                        reason: format!("duplicate of {}", original.display()),
                        path,
                    });
                    continue;
                }
                seen.insert(checksum, path);
                report.documents.push(document);
            }
            Err(error) => report.skipped_files.push(SkippedFile {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(report)
}

fn load_document(
    path: &Path,
    options: &IngestionOptions,
) -> Result<(String, NewDocument), IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;
    let format = SourceFormat::from_path(path)
        .ok_or_else(|| IngestError::UnsupportedFormat(path.display().to_string()))?;

    let content = extract_text(path)?;
    if content.trim().is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "{} has no text",
            path.display()
        )));
    }

    let checksum = digest_file(path)?;
    let source_path = path.to_string_lossy().to_string();

    let mut document = NewDocument {
        title: name.to_string(),
        content,
        document_type: options.document_type.clone(),
        category: options.category.clone(),
        source: Some(options.source.clone().unwrap_or_else(|| source_path.clone())),
        tags: options.tags.clone(),
        ..NewDocument::default()
    };
    document
        .metadata
        .insert("checksum".to_string(), Value::from(checksum.clone()));
    document
        .metadata
        .insert("source_path".to_string(), Value::from(source_path));
    document
        .metadata
        .insert("format".to_string(), Value::from(format.as_str()));

    Ok((checksum, document))
}

pub struct DocumentIndexer {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
}

impl DocumentIndexer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
        }
    }

    pub async fn ingest_folder(
        &self,
        folder: &Path,
        options: &IngestionOptions,
    ) -> Result<IngestionReport, IngestError> {
        let loaded = load_folder_best_effort(folder, options)?;
        for skipped in &loaded.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
        }

        let documents = self.index_documents(loaded.documents).await?;
        info!(
            folder = %folder.display(),
            indexed = documents.len(),
            skipped = loaded.skipped_files.len(),
            "folder ingested"
        );

        Ok(IngestionReport {
            documents,
            skipped_files: loaded.skipped_files,
        })
    }

    /// Creates the documents, then adds their embeddings. When any step fails,
    /// the documents created in this call are removed from the store again.
    pub async fn index_documents(
        &self,
        documents: Vec<NewDocument>,
    ) -> Result<Vec<LegalDocument>, RetrievalError> {
        let mut created = Vec::with_capacity(documents.len());
        let mut outcome = Ok(());
        for document in documents {
            match self.store.create(document).await {
                Ok(document) => created.push(document),
                Err(error) => {
                    outcome = Err(error);
                    break;
                }
            }
        }
        if outcome.is_ok() && !created.is_empty() {
            outcome = self.add_embeddings(&created).await;
        }

        if let Err(error) = outcome {
            self.roll_back(&created).await;
            return Err(error);
        }
        Ok(created)
    }

    async fn roll_back(&self, created: &[LegalDocument]) {
        for document in created {
            if let Err(cleanup) = self.store.delete(&document.id).await {
                warn!(id = %document.id, error = %cleanup, "failed to roll back document");
            }
        }
    }

    async fn add_embeddings(&self, documents: &[LegalDocument]) -> Result<(), RetrievalError> {
        let contents: Vec<String> = documents
            .iter()
            .map(|document| document.content.clone())
            .collect();
        let embeddings = self.embedder.embed_batch(&contents).await?;

        let entries: Vec<VectorEntry> = documents
            .iter()
            .zip(embeddings)
            .map(|(document, embedding)| vector_entry(document, embedding))
            .collect();
        self.index.add(&entries).await
    }

    pub async fn update_document(
        &self,
        id: &str,
        update: DocumentUpdate,
    ) -> Result<Option<LegalDocument>, RetrievalError> {
        let reindex = update.touches_indexed_fields();
        let Some(document) = self.store.update(id, update).await? else {
            return Ok(None);
        };

        if reindex {
            let embedding = self.embedder.embed(&document.content).await?;
            self.index.update(vector_entry(&document, embedding)).await?;
        }
        Ok(Some(document))
    }

    pub async fn remove(&self, id: &str) -> Result<bool, RetrievalError> {
        let in_store = self.store.delete(id).await?;
        let in_index = self.index.delete(id).await?;
        if in_store != in_index {
            warn!(id, in_store, in_index, "document was only present in one backend");
        }
        Ok(in_store || in_index)
    }
}

fn vector_entry(document: &LegalDocument, embedding: Vec<f32>) -> VectorEntry {
    VectorEntry {
        id: document.id.clone(),
        document: document.content.clone(),
        embedding,
        metadata: document.index_metadata(),
    }
}
