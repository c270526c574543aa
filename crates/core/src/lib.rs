pub mod analysis;
pub mod availability;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod format;
pub mod fusion;
pub mod ingest;
pub mod lexical;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod rerank;
pub mod stores;
pub mod traits;
pub mod vector_search;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use analysis::{
    AnalysisKind, AnalysisReport, DocumentAnalyzer, Entities, EntityCategory, RiskAssessment,
    RiskLevel,
};
pub use availability::ModelAvailability;
pub use config::{
    BackendSettings, EmbeddingSettings, LlmSettings, RerankSettings, RetrievalSettings, Settings,
};
pub use embeddings::{
    CharacterNgramEmbedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_MAX_INPUT_CHARS,
};
pub use error::{AnalysisError, ConfigError, ErrorKind, IngestError, LlmError, RetrievalError};
pub use extractor::{extract_text, SourceFormat};
pub use format::ResultFormatter;
pub use fusion::ResultFuser;
pub use ingest::{
    discover_documents, load_folder_best_effort, DocumentIndexer, IngestionOptions,
    IngestionReport, SkippedFile,
};
pub use lexical::LexicalSearchAdapter;
pub use llm::{ClovaClient, LlmClients, LlmProvider, ModelInfo, OpenAiClient};
pub use models::{
    Candidate, DocumentFilters, DocumentUpdate, FinalResult, FusedCandidate, IndexStats,
    LegalDocument, Metadata, MetadataFilter, NewDocument, RerankedCandidate, RetrievalRequest,
    SearchType, VectorEntry, VectorMatch,
};
pub use orchestrator::{PipelineStage, RetrievalOutcome, RetrievalPipeline, StageFailure};
pub use rerank::{HttpRerankModel, Reranker, DEFAULT_RERANK_BATCH_SIZE};
pub use stores::{InMemoryDocumentStore, InMemoryVectorIndex, OpenSearchDocumentStore, QdrantIndex};
pub use traits::{DocumentStore, EmbeddingService, LlmClient, RerankModel, VectorIndex};
pub use vector_search::VectorSearchAdapter;
pub use workflow::{LegalAssistant, QuestionAnswer, ResearchReport, SystemStatus, WorkflowStep};
