use crate::analysis::{AnalysisKind, AnalysisReport, DocumentAnalyzer};
use crate::config::RetrievalSettings;
use crate::ingest::DocumentIndexer;
use crate::llm::{CompletionRequest, LlmClients, LlmProvider, ModelInfo};
use crate::orchestrator::RetrievalPipeline;
use crate::rerank::Reranker;
use crate::traits::{DocumentStore, EmbeddingService, VectorIndex};
use crate::{FinalResult, IndexStats, LlmError, Metadata, RetrievalRequest};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const RESEARCH_LIMIT: usize = 10;
const QUESTION_LIMIT: usize = 3;
const QUESTION_CONTEXT_DOCUMENTS: usize = 2;

const QUESTION_PROMPT: &str = "You are a professional legal assistant. Answer the user's legal \
question accurately and helpfully. Include a direct answer, the relevant statutes and articles, \
notable precedents if any, and further cautions. Advise consulting a lawyer for specific legal \
advice.";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    RetrievalComplete,
    AnalysisComplete,
    RetrievalError,
    AnalysisError,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    pub run_id: Uuid,
    pub query: String,
    pub step: WorkflowStep,
    pub results: Vec<FinalResult>,
    pub analysis: Option<AnalysisReport>,
    pub error: Option<String>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionAnswer {
    pub run_id: Uuid,
    pub question: String,
    pub answer: String,
    pub related: Vec<FinalResult>,
    /// Retrieval failure that left the answer with less context.
    pub retrieval_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub index: Option<IndexStats>,
    pub index_error: Option<String>,
    pub document_types: Option<usize>,
    pub categories: Option<usize>,
    pub store_error: Option<String>,
    pub embedder: String,
    pub embedding_dimensions: usize,
    pub reranker: Option<String>,
    pub llm: Vec<ModelInfo>,
}

pub struct LegalAssistant {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    pipeline: RetrievalPipeline,
    llm: LlmClients,
}

impl LegalAssistant {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        reranker: Reranker,
        llm: LlmClients,
        settings: RetrievalSettings,
    ) -> Self {
        let pipeline = RetrievalPipeline::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            Arc::clone(&index),
            reranker,
            settings,
        );
        Self {
            store,
            embedder,
            index,
            pipeline,
            llm,
        }
    }

    pub fn pipeline(&self) -> &RetrievalPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn indexer(&self) -> DocumentIndexer {
        DocumentIndexer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
        )
    }

    pub async fn analyze(
        &self,
        content: &str,
        metadata: Metadata,
        kind: AnalysisKind,
        provider: LlmProvider,
    ) -> AnalysisReport {
        let client = self.llm.select(provider);
        match DocumentAnalyzer::new(client) {
            Ok(analyzer) => analyzer.analyze(content, metadata, kind).await,
            Err(error) => {
                AnalysisReport::not_started(kind, provider.to_string(), error.to_string())
            }
        }
    }

    pub async fn research(&self, query: &str, provider: LlmProvider) -> ResearchReport {
        let outcome = self
            .pipeline
            .run_with_timeout(RetrievalRequest::new(query, RESEARCH_LIMIT))
            .await;

        let mut report = ResearchReport {
            run_id: outcome.run_id,
            query: query.to_string(),
            step: WorkflowStep::RetrievalComplete,
            results: Vec::new(),
            analysis: None,
            error: None,
            messages: Vec::new(),
        };

        if outcome.halted() {
            let error = outcome.error.unwrap_or_default();
            warn!(run_id = %report.run_id, error = %error, "research retrieval failed");
            report.messages.push(format!("retrieval failed: {error}"));
            report.error = Some(error);
            report.step = WorkflowStep::RetrievalError;
            return report;
        }

        report.results = outcome.results;
        report.messages.push(format!(
            "retrieval complete: {} documents found",
            report.results.len()
        ));

        let client = self.llm.select(provider);
        let Some(top) = report.results.first().cloned() else {
            report.analysis = Some(AnalysisReport::not_started(
                AnalysisKind::Full,
                client.model_info().provider,
                "no documents to analyze",
            ));
            report.step = WorkflowStep::AnalysisComplete;
            return report;
        };

        if !client.is_available() {
            let error = LlmError::Unavailable {
                provider: client.model_info().provider,
            }
            .to_string();
            report.messages.push(format!("analysis failed: {error}"));
            report.error = Some(error);
            report.step = WorkflowStep::AnalysisError;
            return report;
        }

        let mut metadata = Metadata::new();
        metadata.insert("id".to_string(), Value::from(top.id));
        metadata.insert("title".to_string(), Value::from(top.title));
        let content = top.full_content;

        match DocumentAnalyzer::new(client) {
            Ok(analyzer) => {
                let analysis = analyzer.analyze(&content, metadata, AnalysisKind::Full).await;
                report.analysis = Some(analysis);
                report.messages.push("document analysis complete".to_string());
                report.step = WorkflowStep::AnalysisComplete;
            }
            Err(error) => {
                report.messages.push(format!("analysis failed: {error}"));
                report.error = Some(error.to_string());
                report.step = WorkflowStep::AnalysisError;
            }
        }

        info!(run_id = %report.run_id, step = ?report.step, "research finished");
        report
    }

    pub async fn answer_question(
        &self,
        question: &str,
        provider: LlmProvider,
    ) -> Result<QuestionAnswer, LlmError> {
        let outcome = self
            .pipeline
            .run_with_timeout(RetrievalRequest::new(question, QUESTION_LIMIT))
            .await;
        if let Some(error) = &outcome.error {
            warn!(run_id = %outcome.run_id, error = %error, "answering with degraded retrieval");
        }

        let context = outcome
            .results
            .iter()
            .take(QUESTION_CONTEXT_DOCUMENTS)
            .map(|result| format!("Related document: {}\n{}", result.title, result.content_preview))
            .collect::<Vec<_>>()
            .join("\n");

        let mut user_message = format!("Question: {question}");
        if !context.is_empty() {
            user_message.push_str(&format!("\n\nReference material:\n{context}"));
        }

        let answer = self
            .llm
            .select(provider)
            .complete(CompletionRequest::new(QUESTION_PROMPT, user_message))
            .await?;

        Ok(QuestionAnswer {
            run_id: outcome.run_id,
            question: question.to_string(),
            answer,
            related: outcome.results,
            retrieval_error: outcome.error,
        })
    }

    pub async fn system_status(&self) -> SystemStatus {
        let (stats, types, categories) = tokio::join!(
            self.index.stats(),
            self.store.document_types(),
            self.store.categories()
        );

        let (index, index_error) = match stats {
            Ok(stats) => (Some(stats), None),
            Err(error) => (None, Some(error.to_string())),
        };
        let (document_types, categories, store_error) = match (types, categories) {
            (Ok(types), Ok(categories)) => (Some(types.len()), Some(categories.len()), None),
            (Err(error), _) | (_, Err(error)) => (None, None, Some(error.to_string())),
        };

        SystemStatus {
            index,
            index_error,
            document_types,
            categories,
            store_error,
            embedder: self.embedder.name().to_string(),
            embedding_dimensions: self.embedder.dimensions(),
            reranker: self.pipeline.reranker().model_name().map(str::to_string),
            llm: self.llm.model_infos(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::stores::{InMemoryDocumentStore, InMemoryVectorIndex};
    use crate::testing::{new_document, FailingIndex, ScriptedLlm};
    use crate::RetrievalError;

    const FULL_ANALYSIS: [&str; 6] = [
        "Summary of the lease.",
        "1. Two year term",
        "1. Deposit return is unclear",
        "People:\n- Kim Minsu",
        "1. Clarify deposit return",
        "Risk level: Low - standard terms",
    ];

    fn assistant(
        index: Arc<dyn VectorIndex>,
        openai: ScriptedLlm,
    ) -> (LegalAssistant, Arc<ScriptedLlm>) {
        let openai = Arc::new(openai);
        let llm = LlmClients::new(openai.clone(), Arc::new(ScriptedLlm::offline("clova")));
        let assistant = LegalAssistant::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(CharacterNgramEmbedder::new(64)),
            index,
            Reranker::disabled("not configured"),
            llm,
            RetrievalSettings::default(),
        );
        (assistant, openai)
    }

    async fn seed(assistant: &LegalAssistant) -> Result<(), RetrievalError> {
        assistant
            .indexer()
            .index_documents(vec![
                new_document(
                    "Residential Lease",
                    "lease deposit and rent terms",
                    "contract",
                    "real_estate",
                ),
                new_document(
                    "Lease Renewal Act",
                    "lease renewal rights of tenants",
                    "statute",
                    "real_estate",
                ),
                new_document(
                    "Commercial Lease",
                    "lease of retail premises",
                    "contract",
                    "commerce",
                ),
            ])
            .await
            .map(|_| ())
    }

    #[tokio::test]
    async fn research_analyses_the_top_result() -> Result<(), RetrievalError> {
        let (assistant, llm) = assistant(
            Arc::new(InMemoryVectorIndex::new("legal_documents")),
            ScriptedLlm::named("openai", &FULL_ANALYSIS),
        );
        seed(&assistant).await?;

        let report = assistant.research("lease", LlmProvider::OpenAi).await;
        assert_eq!(report.step, WorkflowStep::AnalysisComplete);
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.messages.len(), 2);

        let analysis = report.analysis.expect("analysis ran");
        assert_eq!(
            analysis.document_metadata["title"],
            report.results[0].title.as_str()
        );
        assert_eq!(analysis.summary.as_deref(), Some("Summary of the lease."));
        assert!(llm.user_messages()[0].contains(&report.results[0].full_content));
        Ok(())
    }

    #[tokio::test]
    async fn research_without_matches_has_nothing_to_analyze() {
        let (assistant, llm) = assistant(
            Arc::new(InMemoryVectorIndex::new("legal_documents")),
            ScriptedLlm::named("openai", &FULL_ANALYSIS),
        );

        let report = assistant.research("indemnity", LlmProvider::OpenAi).await;
        assert_eq!(report.step, WorkflowStep::AnalysisComplete);
        assert!(report.results.is_empty());
        let analysis = report.analysis.expect("placeholder analysis");
        assert_eq!(analysis.error.as_deref(), Some("no documents to analyze"));
        assert!(llm.user_messages().is_empty());
    }

    #[tokio::test]
    async fn research_reports_halted_retrieval() {
        let (assistant, _) = assistant(
            Arc::new(InMemoryVectorIndex::new("legal_documents")),
            ScriptedLlm::named("openai", &[]),
        );

        let report = assistant.research("   ", LlmProvider::OpenAi).await;
        assert_eq!(report.step, WorkflowStep::RetrievalError);
        assert!(report.analysis.is_none());
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn research_without_llm_credentials_is_an_analysis_error() -> Result<(), RetrievalError> {
        let (assistant, _) = assistant(
            Arc::new(InMemoryVectorIndex::new("legal_documents")),
            ScriptedLlm::offline("openai"),
        );
        seed(&assistant).await?;

        let report = assistant.research("lease", LlmProvider::Clova).await;
        assert_eq!(report.step, WorkflowStep::AnalysisError);
        assert!(!report.results.is_empty());
        assert!(report.analysis.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn answers_use_the_two_best_previews() -> Result<(), Box<dyn std::error::Error>> {
        let (assistant, llm) = assistant(
            Arc::new(InMemoryVectorIndex::new("legal_documents")),
            ScriptedLlm::named("openai", &["Tenants may request renewal."]),
        );
        seed(&assistant).await?;

        let answer = assistant
            .answer_question("lease", LlmProvider::OpenAi)
            .await?;
        assert_eq!(answer.answer, "Tenants may request renewal.");
        assert_eq!(answer.related.len(), 3);

        let prompt = &llm.user_messages()[0];
        assert!(prompt.starts_with("Question: lease"));
        assert!(prompt.contains(&format!("Related document: {}", answer.related[0].title)));
        assert!(prompt.contains(&format!("Related document: {}", answer.related[1].title)));
        assert!(!prompt.contains(&format!("Related document: {}", answer.related[2].title)));
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_llm_fails_the_answer() {
        let (assistant, _) = assistant(
            Arc::new(InMemoryVectorIndex::new("legal_documents")),
            ScriptedLlm::offline("openai"),
        );
        let result = assistant.answer_question("lease", LlmProvider::OpenAi).await;
        assert!(matches!(result, Err(LlmError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn status_reports_each_backend() -> Result<(), RetrievalError> {
        let (assistant, _) = assistant(
            Arc::new(InMemoryVectorIndex::new("legal_documents")),
            ScriptedLlm::named("openai", &[]),
        );
        seed(&assistant).await?;

        let status = assistant.system_status().await;
        assert_eq!(status.index.map(|stats| stats.total_documents), Some(3));
        assert_eq!(status.document_types, Some(2));
        assert_eq!(status.categories, Some(2));
        assert_eq!(status.embedding_dimensions, 64);
        assert!(status.reranker.is_none());
        assert_eq!(status.llm.len(), 2);
        assert!(status.llm[0].available);
        assert!(!status.llm[1].available);
        Ok(())
    }

    #[tokio::test]
    async fn status_survives_a_broken_index() {
        let (assistant, _) = assistant(Arc::new(FailingIndex), ScriptedLlm::named("openai", &[]));
        let status = assistant.system_status().await;
        assert!(status.index.is_none());
        assert!(status.index_error.is_some());
        assert_eq!(status.document_types, Some(0));
    }
}
