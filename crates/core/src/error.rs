use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("indexing failed: {0}")]
    Indexing(#[from] RetrievalError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StoreUnavailable,
    EmbeddingFailure,
    IndexQueryFailure,
    RerankFailure,
    OrchestrationFailure,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("vector index query failed: {0}")]
    IndexQueryFailure(String),

    #[error("reranking failed: {0}")]
    RerankFailure(String),

    #[error("orchestration failed: {0}")]
    OrchestrationFailure(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RetrievalError {
    /// Transport-level variants have no kind of their own; the stage that
    /// observed them decides which kind they count as.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::StoreUnavailable(_) => Some(ErrorKind::StoreUnavailable),
            Self::EmbeddingFailure(_) => Some(ErrorKind::EmbeddingFailure),
            Self::IndexQueryFailure(_) => Some(ErrorKind::IndexQueryFailure),
            Self::RerankFailure(_) => Some(ErrorKind::RerankFailure),
            Self::OrchestrationFailure(_) => Some(ErrorKind::OrchestrationFailure),
            Self::BackendResponse { .. }
            | Self::Http(_)
            | Self::Url(_)
            | Self::Serialization(_) => None,
        }
    }

    /// Re-labels transport errors as `kind`, leaving already classified errors alone.
    pub fn classify(self, kind: ErrorKind) -> Self {
        if self.kind().is_some() {
            return self;
        }

        let details = self.to_string();
        match kind {
            ErrorKind::StoreUnavailable => Self::StoreUnavailable(details),
            ErrorKind::EmbeddingFailure => Self::EmbeddingFailure(details),
            ErrorKind::IndexQueryFailure => Self::IndexQueryFailure(details),
            ErrorKind::RerankFailure => Self::RerankFailure(details),
            ErrorKind::OrchestrationFailure => Self::OrchestrationFailure(details),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{provider} client is not configured")]
    Unavailable { provider: String },

    #[error("invalid response from {provider}: {details}")]
    BackendResponse { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("regex error: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_relabels_transport_errors_only() {
        let transport = RetrievalError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "503 Service Unavailable".to_string(),
        };
        let classified = transport.classify(ErrorKind::IndexQueryFailure);
        assert_eq!(classified.kind(), Some(ErrorKind::IndexQueryFailure));
        assert!(classified.to_string().contains("503"));

        let already = RetrievalError::StoreUnavailable("down".to_string());
        let kept = already.classify(ErrorKind::RerankFailure);
        assert_eq!(kept.kind(), Some(ErrorKind::StoreUnavailable));
    }
}
