//! Query orchestration: retrieve, build the grounded prompt, generate,
//! shape the response.

use std::sync::Arc;

use tracing::{debug, info};

use crate::prompt::{build_prompt, truncate_chars, INSUFFICIENT_CONTEXT_ANSWER};
use crate::retriever::Retriever;
use crate::types::{QueryOptions, QueryResult, RetrievalHit, Source};
use quarry_core::{RagConfig, Result};
use quarry_llm::{GenerationParams, Generator};

/// Excerpt length for citations.
const EXCERPT_CHARS: usize = 200;

pub struct Orchestrator {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
}

impl Orchestrator {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    /// Answer a query from the indexed documents.
    ///
    /// With no hits above the threshold the generator is never invoked and
    /// the fixed insufficient-context answer comes back with zero
    /// confidence.
    pub async fn answer(
        &self,
        config: &RagConfig,
        query: &str,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let hits = self
            .retriever
            .retrieve(config, query, options.top_k, options.similarity_threshold)
            .await?;

        if hits.is_empty() {
            info!("no usable context for query; returning refusal");
            return Ok(QueryResult {
                query: query.to_string(),
                answer: INSUFFICIENT_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                model_id: self.generator.model_id(),
                tokens_generated: 0,
                confidence: 0.0,
                retrieved_chunks: options.include_chunks.then(Vec::new),
            });
        }

        let prompt = build_prompt(query, &hits, config);
        debug!("prompt built: {} bytes, {} sources", prompt.len(), hits.len());

        let generation = self
            .generator
            .generate(
                &prompt,
                &GenerationParams {
                    temperature: config.temperature,
                    max_tokens: config.max_tokens,
                    stop: Vec::new(),
                },
            )
            .await?;

        let confidence = hits
            .iter()
            .map(|h| h.similarity)
            .fold(0.0f64, f64::max)
            .clamp(0.0, 1.0);

        let sources = hits.iter().map(project_source).collect();

        Ok(QueryResult {
            query: query.to_string(),
            answer: generation.text,
            sources,
            model_id: self.generator.model_id(),
            tokens_generated: generation.tokens_generated,
            confidence,
            retrieved_chunks: options.include_chunks.then(|| hits.clone()),
        })
    }
}

fn project_source(hit: &RetrievalHit) -> Source {
    Source {
        doc_id: hit.doc_id.clone(),
        chunk_index: hit.chunk_index,
        heading: hit.metadata.heading.clone(),
        similarity: hit.similarity,
        excerpt: truncate_chars(&hit.text, EXCERPT_CHARS).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use quarry_embed::{Embedder, HashedEmbedder};
    use quarry_ingest::{DocumentKind, Indexer};
    use quarry_llm::Generation;
    use quarry_store::{SqliteVectorStore, VectorStore};

    /// Scripted generator that records how often it is called.
    struct MockGenerator {
        reply: String,
        calls: AtomicUsize,
    }

    impl MockGenerator {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for MockGenerator {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<Generation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Generation {
                text: self.reply.clone(),
                tokens_generated: 7,
            })
        }

        fn model_id(&self) -> String {
            "mock-model".into()
        }

        async fn healthy(&self) -> bool {
            true
        }
    }

    async fn orchestrator_over(
        doc: &str,
        generator: Arc<MockGenerator>,
    ) -> (Orchestrator, RagConfig, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::open(dir.path(), "test", 128).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new("hashed-v1", 128));
        let config = RagConfig {
            chunk_size: 200,
            chunk_overlap: 0,
            min_chunk_size: 50,
            embedding_dimension: 128,
            similarity_threshold: 0.0,
            ..Default::default()
        };

        Indexer::new(embedder.clone(), store.clone())
            .index_document(&config, "doc.md", doc, DocumentKind::Markdown, false)
            .await
            .unwrap();

        let retriever = Retriever::new(embedder, store);
        (Orchestrator::new(retriever, generator), config, dir)
    }

    const DOC: &str =
        "# Intro\nRAG combines retrieval with generation.\n\n# Details\nIt reduces hallucinations.";

    #[tokio::test]
    async fn grounded_answer_with_sources_and_confidence() {
        let generator = MockGenerator::new("It reduces hallucinations.");
        let (orchestrator, config, _dir) = orchestrator_over(DOC, generator.clone()).await;

        let result = orchestrator
            .answer(
                &config,
                "What does RAG reduce?",
                &QueryOptions {
                    top_k: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(result.answer.contains("hallucinations"));
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].heading.as_deref(), Some("Details"));
        assert_eq!(result.model_id, "mock-model");
        assert_eq!(result.tokens_generated, 7);
        assert!(result.confidence > 0.0);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn no_hits_short_circuits_the_generator() {
        let generator = MockGenerator::new("should never appear");
        let (orchestrator, config, _dir) = orchestrator_over(DOC, generator.clone()).await;

        let result = orchestrator
            .answer(
                &config,
                "What is the population of Mars in 2050?",
                &QueryOptions {
                    top_k: Some(3),
                    similarity_threshold: Some(0.8),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.answer, INSUFFICIENT_CONTEXT_ANSWER);
        assert!(result.sources.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn confidence_equals_best_hit_similarity() {
        let generator = MockGenerator::new("answer");
        let (orchestrator, config, _dir) = orchestrator_over(DOC, generator).await;

        let result = orchestrator
            .answer(&config, "retrieval generation", &QueryOptions::default())
            .await
            .unwrap();

        let best = result
            .sources
            .iter()
            .map(|s| s.similarity)
            .fold(0.0f64, f64::max);
        assert_eq!(result.confidence, best);
    }

    #[tokio::test]
    async fn include_chunks_attaches_full_texts() {
        let generator = MockGenerator::new("answer");
        let (orchestrator, config, _dir) = orchestrator_over(DOC, generator).await;

        let result = orchestrator
            .answer(
                &config,
                "retrieval generation",
                &QueryOptions {
                    include_chunks: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let chunks = result.retrieved_chunks.unwrap();
        assert_eq!(chunks.len(), result.sources.len());
        assert!(chunks.iter().any(|c| c.text.contains("retrieval")));
    }

    #[tokio::test]
    async fn excerpts_are_capped_at_200_chars() {
        let generator = MockGenerator::new("answer");
        let mut long_doc = String::from("# Long\n");
        for i in 0..60 {
            long_doc.push_str(&format!("Sentence {} about cosine similarity search. ", i));
        }
        let (orchestrator, config, _dir) = orchestrator_over(&long_doc, generator).await;

        let result = orchestrator
            .answer(&config, "cosine similarity", &QueryOptions::default())
            .await
            .unwrap();

        assert!(!result.sources.is_empty());
        for source in &result.sources {
            assert!(source.excerpt.chars().count() <= 200);
        }
    }
}
