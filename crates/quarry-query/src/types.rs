//! Query-path result types.

use serde::{Deserialize, Serialize};

pub use quarry_store::StoreHit as RetrievalHit;

/// Per-request options for answering a query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryOptions {
    /// Override the configured retrieval count.
    pub top_k: Option<usize>,
    /// Attach full retrieved chunk texts to the result.
    #[serde(default)]
    pub include_chunks: bool,
    /// Override the configured similarity threshold.
    pub similarity_threshold: Option<f64>,
}

/// A hit projected into a citation.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub doc_id: String,
    pub chunk_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub similarity: f64,
    /// First 200 characters of the hit text.
    pub excerpt: String,
}

/// A grounded answer with its citations.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub model_id: String,
    pub tokens_generated: u64,
    /// Best hit similarity, or 0 with no hits.
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved_chunks: Option<Vec<RetrievalHit>>,
}
