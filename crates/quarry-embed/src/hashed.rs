//! Deterministic hashed embedder.
//!
//! Buckets character trigrams and whole words into the output dimensions.
//! Not semantically meaningful the way a neural model is, but deterministic,
//! content-sensitive and offline, which makes it the default backend when no
//! embedding model is served locally, and the backend the end-to-end tests
//! run against.

use async_trait::async_trait;

use crate::{normalize, Embedder};
use quarry_core::Result;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "does",
];

pub struct HashedEmbedder {
    model_id: String,
    dim: usize,
}

impl HashedEmbedder {
    pub fn new(model_id: &str, dim: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            dim,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        let lower = text.to_lowercase();

        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
            .collect();

        // BTreeMap keeps accumulation order stable so repeated calls produce
        // bit-identical vectors.
        let mut word_freq = std::collections::BTreeMap::new();
        for word in &words {
            *word_freq.entry(*word).or_insert(0u32) += 1;
        }

        for (word, freq) in &word_freq {
            let chars: Vec<char> = word.chars().collect();
            for i in 0..chars.len().saturating_sub(2) {
                let mut hash = 0u64;
                for &ch in &chars[i..i + 3] {
                    hash = hash.wrapping_mul(37).wrapping_add(ch as u64);
                }
                vector[(hash as usize) % self.dim] += (*freq as f32).sqrt();
            }

            let word_hash = word
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            vector[(word_hash as usize) % self.dim] += *freq as f32;
        }

        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(batch.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn device(&self) -> &str {
        "local"
    }
}
