use crate::availability::ModelAvailability;
use crate::traits::EmbeddingService;
use crate::RetrievalError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8_000;

/// Collapses whitespace runs and truncates to `max_chars` characters.
pub fn preprocess_text(text: &str, max_chars: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_chars {
        return normalized;
    }

    warn!(max_chars, "embedding input truncated");
    normalized.chars().take(max_chars).collect()
}

/// Cosine distance in [0, 2]. Zero vectors are maximally distant from everything.
pub fn cosine_distance(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 1.0;
    }

    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right.iter()) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }

    1.0 - dot / (left_norm.sqrt() * right_norm.sqrt())
}

/// Deterministic hashed character-trigram embedder. Needs no model download,
/// so it doubles as the fallback when the embedding service is unreachable.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
    pub max_input_chars: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = preprocess_text(text, self.max_input_chars).to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingService for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "character-ngram"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.embed_text(text))
    }
}

pub struct HttpEmbedder {
    client: Client,
    embed_url: Url,
    dimensions: usize,
    max_input_chars: usize,
}

impl HttpEmbedder {
    pub async fn connect(endpoint: &str, max_input_chars: usize) -> ModelAvailability<Self> {
        let embed_url = match Url::parse(endpoint).and_then(|base| base.join("embed")) {
            Ok(url) => url,
            Err(error) => return ModelAvailability::unavailable(error.to_string()),
        };

        let mut embedder = Self {
            client: Client::new(),
            embed_url,
            dimensions: 0,
            max_input_chars,
        };

        match embedder.request(&["probe".to_string()]).await {
            Ok(vectors) => match vectors.first().map(Vec::len) {
                Some(dimensions) if dimensions > 0 => {
                    debug!(endpoint, dimensions, "embedding service reachable");
                    embedder.dimensions = dimensions;
                    ModelAvailability::Available(embedder)
                }
                _ => ModelAvailability::unavailable("embedding service returned no vector"),
            },
            Err(error) => ModelAvailability::unavailable(error.to_string()),
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let inputs: Vec<String> = texts
            .iter()
            .map(|text| preprocess_text(text, self.max_input_chars))
            .collect();

        let response = self
            .client
            .post(self.embed_url.clone())
            .json(&json!({ "inputs": inputs, "truncate": true }))
            .send()
            .await
            .map_err(|error| RetrievalError::EmbeddingFailure(error.to_string()))?;

        if !response.status().is_success() {
            return Err(RetrievalError::EmbeddingFailure(format!(
                "embedding service returned {}",
                response.status()
            )));
        }

        let vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|error| RetrievalError::EmbeddingFailure(error.to_string()))?;

        if vectors.len() != texts.len() {
            return Err(RetrievalError::EmbeddingFailure(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "text-embeddings-inference"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RetrievalError::EmbeddingFailure("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}
