//! Quarry LLM — prompted completion from a local model.

pub mod ollama;

pub use ollama::OllamaGenerator;

use async_trait::async_trait;

use quarry_core::Result;

/// Sampling parameters for a single completion.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f64,
    /// Upper bound on generated tokens; backends must respect it.
    pub max_tokens: usize,
    /// Optional stop sequences.
    pub stop: Vec<String>,
}

/// A finished completion.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub tokens_generated: u64,
}

/// Prompted completion backend. Implementations are safe under concurrent
/// calls and abort promptly when the calling future is dropped.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Generation>;

    /// Model identifier reported in responses.
    fn model_id(&self) -> String;

    /// Whether the backend is reachable and the model is loaded.
    async fn healthy(&self) -> bool;
}
