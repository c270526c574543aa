use crate::error::ConfigError;
use crate::rerank::DEFAULT_RERANK_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_PREVIEW_CHARS: usize = 500;
pub const DEFAULT_RERANKER_MODEL: &str = "BAAI/bge-reranker-v2-m3";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CLOVA_ENDPOINT: &str =
    "https://clovastudio.stream.ntruss.com/testapp/v1/chat-completions/HCX-003";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub embedding: EmbeddingSettings,
    pub rerank: RerankSettings,
    pub llm: LlmSettings,
    pub backends: BackendSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retrieval.validate()?;
        self.embedding.validate()?;
        self.llm.validate()?;
        if let Some(endpoint) = &self.rerank.endpoint {
            Url::parse(endpoint)?;
        }
        if self.rerank.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "rerank.batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_limit: usize,
    pub max_limit: usize,
    pub preview_chars: usize,
    pub timeout_secs: u64,
}

impl RetrievalSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "retrieval.max_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::Invalid {
                field: "retrieval.default_limit",
                reason: format!("must be between 1 and {}", self.max_limit),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "retrieval.timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// text-embeddings-inference base URL; the local n-gram embedder is used when unset.
    pub endpoint: Option<String>,
    pub dimensions: usize,
    pub max_input_chars: usize,
}

impl EmbeddingSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding.dimensions",
                reason: "must be positive".to_string(),
            });
        }
        if let Some(endpoint) = &self.endpoint {
            Url::parse(endpoint)?;
        }
        Ok(())
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            dimensions: 768,
            max_input_chars: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RerankSettings {
    pub endpoint: Option<String>,
    pub model: String,
    /// Texts per reranker request, at most the server's `max_client_batch_size`.
    pub batch_size: usize,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: DEFAULT_RERANKER_MODEL.to_string(),
            batch_size: DEFAULT_RERANK_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub clova_api_key: Option<String>,
    pub clova_apigw_api_key: Option<String>,
    pub clova_endpoint: String,
    pub request_timeout_secs: u64,
}

impl LlmSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid {
                field: "llm.temperature",
                reason: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                field: "llm.max_tokens",
                reason: "must be positive".to_string(),
            });
        }
        Url::parse(&self.openai_base_url)?;
        Url::parse(&self.clova_endpoint)?;
        Ok(())
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            temperature: 0.1,
            max_tokens: 4_096,
            clova_api_key: None,
            clova_apigw_api_key: None,
            clova_endpoint: DEFAULT_CLOVA_ENDPOINT.to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub opensearch_url: Option<String>,
    pub opensearch_index: String,
    pub qdrant_url: Option<String>,
    pub qdrant_collection: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            opensearch_url: None,
            opensearch_index: "legal_documents".to_string(),
            qdrant_url: None,
            qdrant_collection: "legal_documents".to_string(),
        }
    }
}
