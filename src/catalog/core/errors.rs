//! Error types for the question catalog.

use thiserror::Error;

/// Question catalog error type.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Caller supplied an unusable value (empty text, bad source id, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The parser found no complete item in non-empty LLM output.
    #[error("no items could be extracted for source {source_id}")]
    ExtractionEmpty {
        /// Source the extraction ran for.
        source_id: String,
    },
    /// The extraction service failed or is not configured.
    #[error("extraction error: {0}")]
    Extraction(String),
    /// Embedding output was missing or malformed.
    #[error("embedding error: {0}")]
    Embedding(String),
    /// Embedding model error from Rig.
    #[error("embedding model error: {0}")]
    EmbeddingModel(#[from] rig::embeddings::EmbeddingError),
    /// Completion error from Rig.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// A vector does not match the dimensionality of the collection.
    #[error("dimension mismatch: collection holds {expected}-d vectors, got {actual}")]
    DimensionMismatch {
        /// Dimensionality already stored.
        expected: usize,
        /// Dimensionality of the rejected vector.
        actual: usize,
    },
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// An external call did not finish in time.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Configured limit.
        seconds: u64,
    },
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure classes used by the API layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The request itself was unusable.
    Input,
    /// Nothing could be extracted; nothing was written.
    NothingToAdd,
    /// LLM or embedding service failure.
    Upstream,
    /// Collection read or write failure.
    Index,
    /// External call exceeded its deadline.
    Timeout,
    /// Anything else.
    Internal,
}

impl CatalogError {
    /// Classify the error for reporting.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::InvalidInput(_) => FailureKind::Input,
            Self::ExtractionEmpty { .. } => FailureKind::NothingToAdd,
            Self::Extraction(_)
            | Self::Embedding(_)
            | Self::EmbeddingModel(_)
            | Self::Completion(_)
            | Self::HttpClient(_) => FailureKind::Upstream,
            Self::DimensionMismatch { .. } | Self::Sqlite(_) | Self::TokioSqlite(_) => {
                FailureKind::Index
            }
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::InvalidConfig(_) | Self::Serialization(_) | Self::Url(_) | Self::Io(_) => {
                FailureKind::Internal
            }
        }
    }

    /// Check if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::HttpClient(_))
    }
}

/// Convenience result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_extraction_is_not_an_index_failure() {
        let err = CatalogError::ExtractionEmpty {
            source_id: "vid1".to_string(),
        };
        assert_eq!(err.failure_kind(), FailureKind::NothingToAdd);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = CatalogError::Timeout {
            operation: "embedding",
            seconds: 30,
        };
        assert_eq!(err.failure_kind(), FailureKind::Timeout);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "embedding timed out after 30s");
    }

    #[test]
    fn test_dimension_mismatch_is_index_failure() {
        let err = CatalogError::DimensionMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(err.failure_kind(), FailureKind::Index);
    }
}
