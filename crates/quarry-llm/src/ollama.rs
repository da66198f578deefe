//! Ollama completion backend.
//!
//! Non-streaming: posts `{ model, prompt, stream: false, options }` to
//! `/api/generate` and reads `{ response, eval_count }`. Model presence is
//! checked against `/api/tags` so a missing pull surfaces as its own error
//! rather than a generic HTTP failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{Generation, GenerationParams, Generator};
use quarry_core::{Error, Result};

const GENERATE_PATH: &str = "/api/generate";
const TAGS_PATH: &str = "/api/tags";
const TAGS_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TaggedModel>,
}

#[derive(Deserialize)]
struct TaggedModel {
    #[serde(default)]
    name: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: serde_json::Value,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self::with_client(Client::new(), base_url, model)
    }

    /// Reuse an existing HTTP client; endpoint and model are captured from
    /// the caller's config snapshot.
    pub fn with_client(client: Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// List models loaded on the backend. Transport failure maps to the
    /// backend-unavailable error so callers can distinguish it from a
    /// missing model.
    async fn loaded_models(&self) -> Result<Vec<String>> {
        let url = format!("{}{}", self.base_url, TAGS_PATH);
        let response = self
            .client
            .get(&url)
            .timeout(TAGS_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::backend("generator", format!("cannot reach {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::backend(
                "generator",
                format!("{} returned {}", url, response.status()),
            ));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::backend("generator", format!("invalid tags response: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn model_loaded(&self) -> Result<bool> {
        let models = self.loaded_models().await?;
        Ok(models.iter().any(|name| name.contains(&self.model)))
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Generation> {
        if !self.model_loaded().await? {
            return Err(Error::ModelMissing(self.model.clone()));
        }

        let mut options = json!({
            "temperature": params.temperature,
            "num_predict": params.max_tokens,
        });
        if !params.stop.is_empty() {
            options["stop"] = json!(params.stop);
        }

        let url = format!("{}{}", self.base_url, GENERATE_PATH);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        };

        debug!("generating with model '{}' ({} prompt bytes)", self.model, prompt.len());

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::backend("generator", format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::backend(
                "generator",
                format!("{} returned {}: {}", url, status, body),
            ));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::backend("generator", format!("invalid response: {}", e)))?;

        Ok(Generation {
            text: body.response.trim().to_string(),
            tokens_generated: body.eval_count,
        })
    }

    fn model_id(&self) -> String {
        self.model.clone()
    }

    async fn healthy(&self) -> bool {
        self.model_loaded().await.unwrap_or(false)
    }
}
