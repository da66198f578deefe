//! Query-side retrieval: embed, search, filter, rank.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::types::RetrievalHit;
use quarry_core::{RagConfig, Result};
use quarry_embed::Embedder;
use quarry_store::VectorStore;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Retrieve up to `top_k` chunks for a query: over-fetch twice the
    /// requested count, drop everything below the similarity threshold,
    /// deduplicate by chunk id, and cut to size. Hits come back in
    /// similarity-descending order with deterministic tie-breaks, so a
    /// fixed index yields a fixed result list.
    pub async fn retrieve(
        &self,
        config: &RagConfig,
        query: &str,
        top_k: Option<usize>,
        threshold: Option<f64>,
    ) -> Result<Vec<RetrievalHit>> {
        let top_k = top_k.unwrap_or(config.top_k);
        let threshold = threshold.unwrap_or(config.similarity_threshold);

        let batch = [query.to_string()];
        let mut vectors = self.embedder.embed(&batch).await?;
        let query_vector = vectors.pop().unwrap_or_default();

        let raw = self.store.search(&query_vector, top_k * 2, None)?;
        debug!(
            "search returned {} hits for top_k={} threshold={}",
            raw.len(),
            top_k,
            threshold
        );

        let mut seen = HashSet::new();
        let hits: Vec<RetrievalHit> = raw
            .into_iter()
            .filter(|hit| hit.similarity >= threshold)
            .filter(|hit| seen.insert(hit.chunk_id.clone()))
            .take(top_k)
            .collect();

        Ok(hits)
    }
}
