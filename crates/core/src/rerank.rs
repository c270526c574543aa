use crate::availability::ModelAvailability;
use crate::traits::RerankModel;
use crate::{ErrorKind, FusedCandidate, RerankedCandidate, RetrievalError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

pub const PASS_THROUGH_SCORE: f64 = 1.0;

pub struct Reranker {
    model: ModelAvailability<Arc<dyn RerankModel>>,
}

impl Reranker {
    pub fn new(model: ModelAvailability<Arc<dyn RerankModel>>) -> Self {
        if let Some(reason) = model.reason() {
            warn!(reason, "reranker unavailable, results keep fused order");
        }
        Self { model }
    }

    pub fn from_model(model: Arc<dyn RerankModel>) -> Self {
        if model.is_available() {
            Self::new(ModelAvailability::Available(model))
        } else {
            let reason = format!("{} reported unavailable", model.name());
            Self::new(ModelAvailability::unavailable(reason))
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::new(ModelAvailability::unavailable(reason))
    }

    pub fn is_available(&self) -> bool {
        self.model.is_available()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.model().map(|model| model.name())
    }

    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<FusedCandidate>,
        limit: usize,
    ) -> Result<Vec<RerankedCandidate>, RetrievalError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let model = match &self.model {
            ModelAvailability::Available(model) => model,
            ModelAvailability::Unavailable { .. } => {
                return Ok(pass_through(candidates, limit, Some(PASS_THROUGH_SCORE)));
            }
        };

        let documents: Vec<&str> = candidates
            .iter()
            .map(|candidate| candidate.candidate.content.as_str())
            .collect();
        let scores = model
            .score_batch(query, &documents)
            .await
            .map_err(|error| error.classify(ErrorKind::RerankFailure))?;

        if scores.len() != candidates.len() {
            return Err(RetrievalError::RerankFailure(format!(
                "model returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            )));
        }

        let mut reranked: Vec<RerankedCandidate> = candidates
            .into_iter()
            .zip(scores)
            .map(|(fused, score)| RerankedCandidate {
                fused,
                rerank_score: Some(if score.is_finite() {
                    score
                } else {
                    f64::NEG_INFINITY
                }),
            })
            .collect();

        reranked.sort_by(|left, right| {
            let left = left.rerank_score.unwrap_or(f64::NEG_INFINITY);
            let right = right.rerank_score.unwrap_or(f64::NEG_INFINITY);
            right.total_cmp(&left)
        });
        reranked.truncate(limit);

        info!(count = reranked.len(), model = model.name(), "reranked candidates");
        Ok(reranked)
    }
}

pub fn pass_through(
    candidates: Vec<FusedCandidate>,
    limit: usize,
    rerank_score: Option<f64>,
) -> Vec<RerankedCandidate> {
    candidates
        .into_iter()
        .take(limit)
        .map(|fused| RerankedCandidate {
            fused,
            rerank_score,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RerankHit {
    index: usize,
    score: f64,
}

pub const DEFAULT_RERANK_BATCH_SIZE: usize = 32;

pub struct HttpRerankModel {
    client: Client,
    rerank_url: Url,
    model: String,
    batch_size: usize,
}

impl HttpRerankModel {
    pub async fn connect(endpoint: &str, model: impl Into<String>) -> ModelAvailability<Self> {
        let base = match Url::parse(endpoint) {
            Ok(base) => base,
            Err(error) => return ModelAvailability::unavailable(error.to_string()),
        };
        let (rerank_url, health_url) = match (base.join("rerank"), base.join("health")) {
            (Ok(rerank), Ok(health)) => (rerank, health),
            (Err(error), _) | (_, Err(error)) => {
                return ModelAvailability::unavailable(error.to_string())
            }
        };

        let client = Client::new();
        match client.get(health_url).send().await {
            Ok(response) if response.status().is_success() => {
                ModelAvailability::Available(Self {
                    client,
                    rerank_url,
                    model: model.into(),
                    batch_size: DEFAULT_RERANK_BATCH_SIZE,
                })
            }
            Ok(response) => ModelAvailability::unavailable(format!(
                "reranker health check returned {}",
                response.status()
            )),
            Err(error) => ModelAvailability::unavailable(error.to_string()),
        }
    }

    /// Texts per `/rerank` request; must not exceed the server's client batch limit.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn score_chunk(
        &self,
        query: &str,
        documents: &[&str],
    ) -> Result<Vec<RerankHit>, RetrievalError> {
        let response = self
            .client
            .post(self.rerank_url.clone())
            .json(&json!({
                "query": query,
                "texts": documents,
                "truncate": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RetrievalError::BackendResponse {
                backend: "reranker".to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RerankModel for HttpRerankModel {
    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.model
    }

    async fn score(&self, query: &str, document: &str) -> Result<f64, RetrievalError> {
        let scores = self.score_batch(query, &[document]).await?;
        scores
            .first()
            .copied()
            .ok_or_else(|| RetrievalError::RerankFailure("empty rerank response".to_string()))
    }

    async fn score_batch(
        &self,
        query: &str,
        documents: &[&str],
    ) -> Result<Vec<f64>, RetrievalError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = Vec::with_capacity(documents.len());
        for (chunk_number, chunk) in documents.chunks(self.batch_size).enumerate() {
            let chunk_hits = self.score_chunk(query, chunk).await?;
            hits.extend(offset_hits(chunk_hits, chunk_number * self.batch_size, chunk.len())?);
        }
        scores_in_input_order(hits, documents.len())
    }
}

/// Shifts chunk-local hit indices to positions in the full input.
fn offset_hits(
    hits: Vec<RerankHit>,
    offset: usize,
    chunk_len: usize,
) -> Result<Vec<RerankHit>, RetrievalError> {
    hits.into_iter()
        .map(|hit| {
            if hit.index >= chunk_len {
                return Err(RetrievalError::RerankFailure(format!(
                    "rerank index {} out of range for a chunk of {chunk_len}",
                    hit.index
                )));
            }
            Ok(RerankHit {
                index: hit.index + offset,
                score: hit.score,
            })
        })
        .collect()
}

fn scores_in_input_order(
    hits: Vec<RerankHit>,
    expected: usize,
) -> Result<Vec<f64>, RetrievalError> {
    let mut scores = vec![None; expected];
    for hit in hits {
        match scores.get_mut(hit.index) {
            Some(slot) => *slot = Some(hit.score),
            None => {
                return Err(RetrievalError::RerankFailure(format!(
                    "rerank index {} out of range",
                    hit.index
                )))
            }
        }
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(index, score)| {
            score.ok_or_else(|| {
                RetrievalError::RerankFailure(format!("no score for document {index}"))
            })
        })
        .collect()
}
