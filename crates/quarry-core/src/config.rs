//! Runtime configuration: validated snapshots with atomic swap.
//!
//! A [`RagConfig`] is immutable once published. Updates go through
//! [`ConfigHandle::update`], which validates the patch, builds a fresh
//! snapshot and swaps the shared pointer; readers never observe a
//! half-applied change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Revision tag of the grounded-prompt template built by the orchestrator.
pub const PROMPT_VERSION: &str = "grounded-v1";

/// Tokenizer approximation identifier surfaced in stats.
pub const TOKEN_ESTIMATOR: &str = "whitespace-punct-v1";

/// Full configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Master switch; when false, index and query requests are refused.
    pub enabled: bool,

    // Chunking
    /// Target tokens per chunk.
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Token floor per chunk.
    pub min_chunk_size: usize,

    // Embedding
    /// Batch cap passed to the embedder.
    pub embed_batch_size: usize,
    /// Embedding backend selector. Not changeable at runtime.
    pub embedding_model: String,
    /// Vector dimension, fixed at startup from the embedder.
    pub embedding_dimension: usize,

    // Storage
    /// Storage root for the collection and saved config. Not changeable at runtime.
    pub vector_db_path: PathBuf,
    /// Collection identifier. Not changeable at runtime.
    pub collection_name: String,

    // Retrieval
    /// Default number of chunks to retrieve.
    pub top_k: usize,
    /// Minimum similarity for a hit to survive filtering.
    pub similarity_threshold: f64,

    // Generation
    /// Base URL of the local generator endpoint.
    pub generator_endpoint: String,
    /// Model identifier passed to the generator.
    pub generator_model: String,
    pub temperature: f64,
    /// Upper bound on generated tokens.
    pub max_tokens: usize,
    /// Total prompt token budget.
    pub context_window: usize,
    /// Per-hit character cap when rendering context into the prompt.
    pub context_chunk_chars: usize,

    /// Prompt template revision (read-only).
    #[serde(default = "default_prompt_version")]
    pub prompt_version: String,
}

fn default_prompt_version() -> String {
    PROMPT_VERSION.to_string()
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: 800,
            chunk_overlap: 100,
            min_chunk_size: 100,
            embed_batch_size: 32,
            embedding_model: "hashed-v1".into(),
            embedding_dimension: 384,
            vector_db_path: PathBuf::from("./data/quarry"),
            collection_name: "quarry_documents".into(),
            top_k: 5,
            similarity_threshold: 0.3,
            generator_endpoint: "http://localhost:11434".into(),
            generator_model: "gemma2:2b".into(),
            temperature: 0.3,
            max_tokens: 512,
            context_window: 2048,
            context_chunk_chars: 2000,
            prompt_version: PROMPT_VERSION.into(),
        }
    }
}

impl RagConfig {
    /// Check every range constraint. Called on load and before any swap.
    pub fn validate(&self) -> Result<()> {
        fn range<T: PartialOrd + std::fmt::Display>(
            name: &str,
            value: T,
            lo: T,
            hi: T,
        ) -> Result<()> {
            if value < lo || value > hi {
                return Err(Error::Validation(format!(
                    "{} must be in [{}, {}], got {}",
                    name, lo, hi, value
                )));
            }
            Ok(())
        }

        range("chunk_size", self.chunk_size, 200, 2000)?;
        range("chunk_overlap", self.chunk_overlap, 0, 500)?;
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.min_chunk_size < 50 {
            return Err(Error::Validation(format!(
                "min_chunk_size must be at least 50, got {}",
                self.min_chunk_size
            )));
        }
        if self.min_chunk_size > self.chunk_size {
            return Err(Error::Validation(format!(
                "min_chunk_size ({}) must not exceed chunk_size ({})",
                self.min_chunk_size, self.chunk_size
            )));
        }
        range("embed_batch_size", self.embed_batch_size, 1, 256)?;
        range("top_k", self.top_k, 1, 20)?;
        range("similarity_threshold", self.similarity_threshold, 0.0, 1.0)?;
        range("temperature", self.temperature, 0.0, 1.0)?;
        range("max_tokens", self.max_tokens, 1, 8192)?;
        range("context_window", self.context_window, 512, 32768)?;
        range("context_chunk_chars", self.context_chunk_chars, 200, 8000)?;
        Ok(())
    }

    /// Byte ceiling per chunk, guarding against non-tokenizable input.
    pub fn max_chunk_bytes(&self) -> usize {
        self.chunk_size * 8
    }

    /// Location of the saved snapshot inside the storage root.
    pub fn config_file(&self) -> PathBuf {
        self.vector_db_path.join("config.json")
    }

    /// Load a snapshot from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: RagConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the snapshot as a single pretty-printed JSON object.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Partial update for the mutable subset of [`RagConfig`].
///
/// Immutable fields are still present so that an attempt to set them is
/// reported as such rather than as an unknown field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigPatch {
    pub enabled: Option<bool>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub min_chunk_size: Option<usize>,
    pub embed_batch_size: Option<usize>,
    pub top_k: Option<usize>,
    pub similarity_threshold: Option<f64>,
    pub generator_endpoint: Option<String>,
    pub generator_model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<usize>,
    pub context_window: Option<usize>,
    pub context_chunk_chars: Option<usize>,

    // Immutable at runtime; presence alone is an error.
    pub embedding_model: Option<String>,
    pub embedding_dimension: Option<usize>,
    pub vector_db_path: Option<String>,
    pub collection_name: Option<String>,
    pub prompt_version: Option<String>,
}

impl ConfigPatch {
    /// Name of the first immutable field present in the patch, if any.
    fn immutable_field(&self) -> Option<&'static str> {
        if self.embedding_model.is_some() {
            Some("embedding_model")
        } else if self.embedding_dimension.is_some() {
            Some("embedding_dimension")
        } else if self.vector_db_path.is_some() {
            Some("vector_db_path")
        } else if self.collection_name.is_some() {
            Some("collection_name")
        } else if self.prompt_version.is_some() {
            Some("prompt_version")
        } else {
            None
        }
    }

    /// Apply the mutable fields onto a copy of `base`.
    fn apply(&self, base: &RagConfig) -> RagConfig {
        let mut next = base.clone();
        if let Some(v) = self.enabled {
            next.enabled = v;
        }
        if let Some(v) = self.chunk_size {
            next.chunk_size = v;
        }
        if let Some(v) = self.chunk_overlap {
            next.chunk_overlap = v;
        }
        if let Some(v) = self.min_chunk_size {
            next.min_chunk_size = v;
        }
        if let Some(v) = self.embed_batch_size {
            next.embed_batch_size = v;
        }
        if let Some(v) = self.top_k {
            next.top_k = v;
        }
        if let Some(v) = self.similarity_threshold {
            next.similarity_threshold = v;
        }
        if let Some(v) = &self.generator_endpoint {
            next.generator_endpoint = v.clone();
        }
        if let Some(v) = &self.generator_model {
            next.generator_model = v.clone();
        }
        if let Some(v) = self.temperature {
            next.temperature = v;
        }
        if let Some(v) = self.max_tokens {
            next.max_tokens = v;
        }
        if let Some(v) = self.context_window {
            next.context_window = v;
        }
        if let Some(v) = self.context_chunk_chars {
            next.context_chunk_chars = v;
        }
        next
    }
}

/// Shared handle over the current snapshot.
pub struct ConfigHandle {
    inner: RwLock<Arc<RagConfig>>,
}

impl ConfigHandle {
    pub fn new(config: RagConfig) -> Self {
        Self {
            inner: RwLock::new(Arc::new(config)),
        }
    }

    /// Current snapshot. Callers capture it once per operation.
    pub fn get(&self) -> Arc<RagConfig> {
        self.inner.read().clone()
    }

    /// Validate and publish a patched snapshot.
    ///
    /// A rejected patch leaves the current snapshot untouched.
    pub fn update(&self, patch: &ConfigPatch) -> Result<Arc<RagConfig>> {
        if let Some(field) = patch.immutable_field() {
            return Err(Error::ImmutableField(field.to_string()));
        }

        let next = patch.apply(&self.get());
        next.validate()?;

        let next = Arc::new(next);
        *self.inner.write() = next.clone();
        info!("config updated");
        Ok(next)
    }
}
