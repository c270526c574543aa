use crate::config::RetrievalSettings;
use crate::format::ResultFormatter;
use crate::fusion::ResultFuser;
use crate::lexical::LexicalSearchAdapter;
use crate::rerank::{pass_through, Reranker};
use crate::traits::{DocumentStore, EmbeddingService, VectorIndex};
use crate::vector_search::VectorSearchAdapter;
use crate::{
    Candidate, ErrorKind, FinalResult, FusedCandidate, RerankedCandidate, RetrievalError,
    RetrievalRequest,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    LexicalSearch,
    VectorSearch,
    Fuse,
    Rerank,
    Format,
    Done,
}

impl PipelineStage {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Start => Some(Self::LexicalSearch),
            Self::LexicalSearch => Some(Self::VectorSearch),
            Self::VectorSearch => Some(Self::Fuse),
            Self::Fuse => Some(Self::Rerank),
            Self::Rerank => Some(Self::Format),
            Self::Format => Some(Self::Done),
            Self::Done => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::LexicalSearch => "lexical_search",
            Self::VectorSearch => "vector_search",
            Self::Fuse => "fuse",
            Self::Rerank => "rerank",
            Self::Format => "format",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of one pipeline run. An empty `results` list is only meaningful
/// together with `error`: check it before treating "no results" as "no matches".
#[must_use]
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub run_id: Uuid,
    pub results: Vec<FinalResult>,
    pub error: Option<String>,
    pub failures: Vec<StageFailure>,
}

impl RetrievalOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn halted(&self) -> bool {
        self.failures
            .iter()
            .any(|failure| failure.kind == ErrorKind::OrchestrationFailure)
    }

    pub fn into_result(self) -> Result<Vec<FinalResult>, StageFailure> {
        match self.failures.into_iter().last() {
            Some(failure) => Err(failure),
            None => Ok(self.results),
        }
    }
}

/// Per-run state. Every stage consumes the record and hands back the next one.
#[derive(Debug)]
struct RetrievalState {
    request: RetrievalRequest,
    stage: PipelineStage,
    lexical: Vec<Candidate>,
    vector: Vec<Candidate>,
    fused: Vec<FusedCandidate>,
    reranked: Vec<RerankedCandidate>,
    final_results: Vec<FinalResult>,
    failures: Vec<StageFailure>,
}

impl RetrievalState {
    fn new(request: RetrievalRequest) -> Self {
        Self {
            request,
            stage: PipelineStage::Start,
            lexical: Vec::new(),
            vector: Vec::new(),
            fused: Vec::new(),
            reranked: Vec::new(),
            final_results: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn advance(mut self, to: PipelineStage) -> Result<Self, (Self, RetrievalError)> {
        if self.stage.next() != Some(to) {
            let error = RetrievalError::OrchestrationFailure(format!(
                "invalid transition {} -> {}",
                self.stage, to
            ));
            return Err((self, error));
        }
        debug!(from = %self.stage, to = %to, "pipeline transition");
        self.stage = to;
        Ok(self)
    }

    fn record(mut self, error: RetrievalError, fallback: ErrorKind) -> Self {
        let kind = error.kind().unwrap_or(fallback);
        warn!(stage = %self.stage, kind = ?kind, %error, "stage failed, continuing");
        self.failures.push(StageFailure {
            stage: self.stage,
            kind,
            message: error.to_string(),
        });
        self
    }

    fn with_lexical(
        self,
        result: Result<Vec<Candidate>, RetrievalError>,
    ) -> Result<Self, (Self, RetrievalError)> {
        let state = self.advance(PipelineStage::LexicalSearch)?;
        Ok(match result {
            Ok(lexical) => Self { lexical, ..state },
            Err(error) => state.record(error, ErrorKind::StoreUnavailable),
        })
    }

    fn with_vector(
        self,
        result: Result<Vec<Candidate>, RetrievalError>,
    ) -> Result<Self, (Self, RetrievalError)> {
        let state = self.advance(PipelineStage::VectorSearch)?;
        Ok(match result {
            Ok(vector) => Self { vector, ..state },
            Err(error) => state.record(error, ErrorKind::IndexQueryFailure),
        })
    }

    fn with_fused(self, fuser: &ResultFuser) -> Result<Self, (Self, RetrievalError)> {
        let mut state = self.advance(PipelineStage::Fuse)?;
        let lexical = std::mem::take(&mut state.lexical);
        let vector = std::mem::take(&mut state.vector);
        let fused = fuser.fuse(lexical, vector, state.request.limit);
        Ok(Self { fused, ..state })
    }

    fn with_reranked(
        self,
        result: Result<Vec<RerankedCandidate>, RetrievalError>,
    ) -> Result<Self, (Self, RetrievalError)> {
        let mut state = self.advance(PipelineStage::Rerank)?;
        let fused = std::mem::take(&mut state.fused);
        Ok(match result {
            Ok(reranked) => Self { reranked, ..state },
            Err(error) => {
                let limit = state.request.limit;
                let state = state.record(error, ErrorKind::RerankFailure);
                Self {
                    reranked: pass_through(fused, limit, None),
                    ..state
                }
            }
        })
    }

    fn with_formatted(self, formatter: &ResultFormatter) -> Result<Self, (Self, RetrievalError)> {
        let mut state = self.advance(PipelineStage::Format)?;
        let reranked = std::mem::take(&mut state.reranked);
        let final_results = formatter.format(reranked);
        Ok(Self {
            final_results,
            ..state
        })
    }

    fn finish(self) -> Result<Self, (Self, RetrievalError)> {
        self.advance(PipelineStage::Done)
    }

    fn into_outcome(self, run_id: Uuid) -> RetrievalOutcome {
        RetrievalOutcome {
            run_id,
            error: self.failures.last().map(|failure| failure.message.clone()),
            results: self.final_results,
            failures: self.failures,
        }
    }

    /// Orchestration failures stop the run and drop any partial results.
    fn into_halted(mut self, run_id: Uuid, error: RetrievalError) -> RetrievalOutcome {
        warn!(stage = %self.stage, %error, "retrieval halted");
        self.failures.push(StageFailure {
            stage: self.stage,
            kind: ErrorKind::OrchestrationFailure,
            message: error.to_string(),
        });
        self.final_results.clear();
        self.into_outcome(run_id)
    }
}

pub struct RetrievalPipeline {
    lexical: LexicalSearchAdapter,
    vector: VectorSearchAdapter,
    fuser: ResultFuser,
    reranker: Reranker,
    formatter: ResultFormatter,
    settings: RetrievalSettings,
}

impl RetrievalPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        reranker: Reranker,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            lexical: LexicalSearchAdapter::new(store),
            vector: VectorSearchAdapter::new(embedder, index),
            fuser: ResultFuser,
            formatter: ResultFormatter::new(settings.preview_chars),
            reranker,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    pub async fn run(&self, request: RetrievalRequest) -> RetrievalOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("retrieval", %run_id, query = %request.query, limit = request.limit);

        async move {
            let state = RetrievalState::new(request);
            if let Err(error) = self.validate(&state.request) {
                return state.into_halted(run_id, error);
            }

            match self.execute(state).await {
                Ok(state) => {
                    info!(
                        results = state.final_results.len(),
                        failures = state.failures.len(),
                        "retrieval finished"
                    );
                    state.into_outcome(run_id)
                }
                Err((state, error)) => state.into_halted(run_id, error),
            }
        }
        .instrument(span)
        .await
    }

    /// `run` bounded by the configured timeout; expiry counts as an orchestration failure.
    pub async fn run_with_timeout(&self, request: RetrievalRequest) -> RetrievalOutcome {
        let timeout = self.settings.timeout();
        match tokio::time::timeout(timeout, self.run(request.clone())).await {
            Ok(outcome) => outcome,
            Err(_) => RetrievalState::new(request).into_halted(
                Uuid::new_v4(),
                RetrievalError::OrchestrationFailure(format!(
                    "retrieval timed out after {}s",
                    timeout.as_secs()
                )),
            ),
        }
    }

    fn validate(&self, request: &RetrievalRequest) -> Result<(), RetrievalError> {
        if request.query.trim().is_empty() {
            return Err(RetrievalError::OrchestrationFailure(
                "query is empty".to_string(),
            ));
        }
        if request.limit == 0 || request.limit > self.settings.max_limit {
            return Err(RetrievalError::OrchestrationFailure(format!(
                "limit {} is outside 1..={}",
                request.limit, self.settings.max_limit
            )));
        }
        Ok(())
    }

    async fn execute(
        &self,
        state: RetrievalState,
    ) -> Result<RetrievalState, (RetrievalState, RetrievalError)> {
        let request = &state.request;
        let (lexical, vector) = tokio::join!(
            self.lexical
                .search(&request.query, &request.filters, request.limit),
            self.vector.search(&request.query, request.limit)
        );

        let state = state.with_lexical(lexical)?.with_vector(vector)?;
        let state = state.with_fused(&self.fuser)?;

        let reranked = self
            .reranker
            .rerank(&state.request.query, state.fused.clone(), state.request.limit)
            .await;
        state
            .with_reranked(reranked)?
            .with_formatted(&self.formatter)?
            .finish()
    }
}
