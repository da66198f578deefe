//! Shared application state.
//!
//! One explicit service value owns the config handle and every backend;
//! route handlers reach everything through it. The generator is built per
//! request from the captured config snapshot because its endpoint and
//! model are runtime-tunable.

use std::sync::Arc;

use quarry_core::{ConfigHandle, RagConfig};
use quarry_embed::Embedder;
use quarry_ingest::Indexer;
use quarry_llm::{Generator, OllamaGenerator};
use quarry_query::{Orchestrator, Retriever};
use quarry_store::VectorStore;

pub struct AppState {
    pub config: ConfigHandle,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    /// Long-lived so per-document locks survive across requests.
    pub indexer: Indexer,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let indexer = Indexer::new(embedder.clone(), store.clone());
        Self {
            config: ConfigHandle::new(config),
            embedder,
            store,
            indexer,
            http: reqwest::Client::new(),
        }
    }

    /// Generator pointed at the snapshot's endpoint and model.
    pub fn generator(&self, config: &RagConfig) -> Arc<dyn Generator> {
        Arc::new(OllamaGenerator::with_client(
            self.http.clone(),
            &config.generator_endpoint,
            &config.generator_model,
        ))
    }

    /// Orchestrator over the shared backends and a snapshot-bound generator.
    pub fn orchestrator(&self, config: &RagConfig) -> Orchestrator {
        let retriever = Retriever::new(self.embedder.clone(), self.store.clone());
        Orchestrator::new(retriever, self.generator(config))
    }
}
