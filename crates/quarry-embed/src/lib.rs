//! Quarry Embed — batched text-to-vector backends.
//!
//! The [`Embedder`] trait abstracts over embedding generation. Two backends
//! ship here: an Ollama HTTP client for real sentence-embedding models and a
//! deterministic hashed embedder for offline use.

pub mod hashed;
pub mod ollama;

pub use hashed::HashedEmbedder;
pub use ollama::OllamaEmbedder;

use std::sync::Arc;

use async_trait::async_trait;

use quarry_core::{RagConfig, Result};

/// Batched embedding backend. Implementations are safe under concurrent
/// calls, preserve input order, and return L2-normalized vectors of a fixed
/// dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Fixed output dimension.
    fn dim(&self) -> usize;

    /// Model identifier reported in stats.
    fn model_id(&self) -> &str;

    /// Where the model runs ("local" or "http").
    fn device(&self) -> &str;
}

/// Build the embedder selected by `embedding_model`.
///
/// Names starting with `hashed` select the deterministic local backend;
/// anything else is treated as an Ollama embedding model served from the
/// generator endpoint host.
pub fn create_embedder(config: &RagConfig) -> Arc<dyn Embedder> {
    if config.embedding_model.starts_with("hashed") {
        tracing::info!(
            "using hashed embedder '{}' (dim={})",
            config.embedding_model,
            config.embedding_dimension
        );
        Arc::new(HashedEmbedder::new(
            &config.embedding_model,
            config.embedding_dimension,
        ))
    } else {
        tracing::info!(
            "using Ollama embedder '{}' at {} (dim={})",
            config.embedding_model,
            config.generator_endpoint,
            config.embedding_dimension
        );
        Arc::new(OllamaEmbedder::new(
            &config.generator_endpoint,
            &config.embedding_model,
            config.embedding_dimension,
        ))
    }
}

/// L2-normalize a vector in place; zero vectors are left as-is.
pub(crate) fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
