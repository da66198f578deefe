//! Ollama embedding backend.
//!
//! Talks to Ollama's `/api/embeddings` endpoint one prompt at a time (the
//! API has no batch form) and verifies the advertised dimension on every
//! response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{normalize, Embedder};
use quarry_core::{Error, Result};

const EMBEDDINGS_PATH: &str = "/api/embeddings";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dim: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, dim: usize) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dim,
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDINGS_PATH);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::backend("embedder", format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::backend(
                "embedder",
                format!("{} returned {}: {}", url, status, body),
            ));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::backend("embedder", format!("invalid response: {}", e)))?;

        if body.embedding.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                got: body.embedding.len(),
            });
        }

        let mut vector = body.embedding;
        normalize(&mut vector);
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!("embedding batch of {} texts", batch.len());
        let mut vectors = Vec::with_capacity(batch.len());
        for text in batch {
            vectors.push(self.embed_one(text).await?);
        }
        Ok(vectors)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn device(&self) -> &str {
        "http"
    }
}
