//! Embedding model wrapper for Rig + Ollama.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client as ReqwestClient;
use rig::client::{EmbeddingsClient, Nothing};
use rig::embeddings::EmbeddingModel;
use rig::providers::ollama;

use crate::catalog::core::config::EmbeddingConfig;
use crate::catalog::core::errors::{CatalogError, CatalogResult};

/// Boxed future type for embedder operations.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstraction over embedding models.
pub trait Embedder: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    /// Returns an error if the embedding request fails.
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, CatalogResult<Vec<f32>>>;

    /// Return embedding dimensionality.
    fn ndims(&self) -> usize;
}

type OllamaEmbeddingModel = ollama::EmbeddingModel<ReqwestClient>;

/// Ollama embedder using Rig provider.
#[derive(Clone)]
pub struct OllamaEmbedder {
    model: OllamaEmbeddingModel,
    ndims: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder from config.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> CatalogResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(CatalogError::from)?;
        let model = client.embedding_model_with_ndims(config.model.clone(), config.ndims);
        Ok(Self {
            model,
            ndims: config.ndims,
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, CatalogResult<Vec<f32>>> {
        let text = text.to_string();
        Box::pin(async move {
            let embedding = self
                .model
                .embed_text(&text)
                .await
                .map_err(CatalogError::EmbeddingModel)?;
            #[allow(clippy::cast_possible_truncation)]
            let vector = embedding.vec.into_iter().map(|v| v as f32).collect();
            Ok(vector)
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{FailingEmbedder, KeywordEmbedder};
    use super::*;

    #[tokio::test]
    async fn test_keyword_embedder_is_deterministic() {
        let embedder = KeywordEmbedder::new(8);
        let first = embedder.embed_text("abc").await.unwrap();
        let second = embedder.embed_text("abc").await.unwrap();
        let other = embedder.embed_text("zzz").await.unwrap();

        assert_eq!(embedder.calls(), 3);
        assert_eq!(first.len(), 8);
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_failing_embedder() {
        let result = FailingEmbedder.embed_text("a").await;
        assert!(matches!(result, Err(CatalogError::Embedding(_))));
    }

    #[test]
    fn test_ollama_embedder_reports_configured_dims() {
        let config = EmbeddingConfig {
            ndims: 384,
            ..EmbeddingConfig::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        assert_eq!(embedder.ndims(), 384);
    }
}
