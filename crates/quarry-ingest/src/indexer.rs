//! Indexing pipeline: chunk → embed (batched) → upsert.
//!
//! Embedding for a whole document completes before the first upsert, so a
//! document that fails mid-embedding leaves no partial presence. Per-doc
//! keyed locks serialize re-indexing of the same document while distinct
//! documents proceed in parallel.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::chunker::{Chunker, DocumentChunk, DocumentKind};
use quarry_core::{Error, RagConfig, Result};
use quarry_embed::Embedder;
use quarry_store::{ChunkRecord, DeleteFilter, VectorStore};

/// Overall cap on concurrent embedding calls across documents, keeping the
/// embedder from starving the generator.
const EMBED_MAX_INFLIGHT: usize = 2;

/// Outcome of indexing one document.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub doc_id: String,
    pub chunks_created: usize,
    pub bytes_in: usize,
    pub elapsed_ms: u64,
}

/// Outcome of indexing a directory.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryReport {
    pub total_files: usize,
    pub indexed_files: usize,
    pub total_chunks: usize,
    pub errors: Vec<String>,
}

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    doc_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    embed_limiter: Arc<Semaphore>,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            doc_locks: Mutex::new(HashMap::new()),
            embed_limiter: Arc::new(Semaphore::new(EMBED_MAX_INFLIGHT)),
        }
    }

    fn doc_lock(&self, doc_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.doc_locks
            .lock()
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Chunk, embed and upsert one document under the settings captured in
    /// `config`. Re-indexing an existing `doc_id` replaces its chunks.
    pub async fn index_document(
        &self,
        config: &RagConfig,
        doc_id: &str,
        text: &str,
        kind: DocumentKind,
        clear_existing: bool,
    ) -> Result<IndexReport> {
        let lock = self.doc_lock(doc_id);
        let _guard = lock.lock().await;
        let started = Instant::now();

        if clear_existing {
            self.store.clear()?;
        }

        let chunker = Chunker::from_config(config);
        let chunks = chunker.chunk(doc_id, text, kind)?;
        info!("chunked '{}' into {} chunks", doc_id, chunks.len());

        // Embed everything first; a failure here leaves the store untouched.
        let vectors = self.embed_chunks(config, &chunks).await?;

        if !clear_existing {
            // Replace any previous content for this document.
            let removed = self.store.delete(&DeleteFilter::Doc(doc_id.to_string()))?;
            if removed > 0 {
                info!("replaced {} existing chunks of '{}'", removed, doc_id);
            }
        }

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| ChunkRecord {
                id: chunk.id,
                doc_id: chunk.doc_id,
                chunk_index: chunk.chunk_index,
                text: chunk.text,
                token_estimate: chunk.token_estimate,
                metadata: chunk.metadata,
                embedding,
            })
            .collect();

        let mut upserted = 0;
        for batch in records.chunks(config.embed_batch_size) {
            match self.store.upsert(batch) {
                Ok(n) => upserted += n,
                Err(e) => {
                    // Idempotent ids make a retry on the same input safe.
                    warn!(
                        "upsert failed for '{}' after {} of {} chunks: {}",
                        doc_id,
                        upserted,
                        records.len(),
                        e
                    );
                    return Err(Error::Storage(format!(
                        "upserted {} of {} chunks for '{}': {}",
                        upserted,
                        records.len(),
                        doc_id,
                        e
                    )));
                }
            }
        }

        let report = IndexReport {
            doc_id: doc_id.to_string(),
            chunks_created: upserted,
            bytes_in: text.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "indexed '{}': {} chunks, {} bytes in {} ms",
            report.doc_id, report.chunks_created, report.bytes_in, report.elapsed_ms
        );
        Ok(report)
    }

    /// Embed all chunks in order, batched by `embed_batch_size`, verifying
    /// every vector against the collection dimension before anything is
    /// written.
    async fn embed_chunks(
        &self,
        config: &RagConfig,
        chunks: &[DocumentChunk],
    ) -> Result<Vec<Vec<f32>>> {
        let expected = self.store.dim();
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(config.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let permit = self
                .embed_limiter
                .acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            let embedded = self.embedder.embed(&texts).await?;
            drop(permit);

            if embedded.len() != texts.len() {
                return Err(Error::backend(
                    "embedder",
                    format!("returned {} vectors for {} texts", embedded.len(), texts.len()),
                ));
            }
            for vector in &embedded {
                if vector.len() != expected {
                    return Err(Error::DimensionMismatch {
                        expected,
                        got: vector.len(),
                    });
                }
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Index every matching file in a directory. Errors are collected per
    /// file rather than aborting the walk.
    pub async fn index_directory(
        &self,
        config: &RagConfig,
        dir: &Path,
        clear_existing: bool,
    ) -> Result<DirectoryReport> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!(
                "directory not found: {}",
                dir.display()
            )));
        }

        let mut files: Vec<std::path::PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| detect_kind(path).is_ok())
            .collect();
        files.sort();

        if clear_existing {
            self.store.clear()?;
        }

        let mut report = DirectoryReport {
            total_files: files.len(),
            indexed_files: 0,
            total_chunks: 0,
            errors: Vec::new(),
        };

        for path in files {
            let doc_id = file_doc_id(&path);
            let kind = match detect_kind(&path) {
                Ok(kind) => kind,
                Err(_) => continue,
            };
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    report.errors.push(format!("{}: {}", doc_id, e));
                    continue;
                }
            };
            match self
                .index_document(config, &doc_id, &text, kind, false)
                .await
            {
                Ok(r) => {
                    report.indexed_files += 1;
                    report.total_chunks += r.chunks_created;
                }
                Err(e) => report.errors.push(format!("{}: {}", doc_id, e)),
            }
        }

        Ok(report)
    }
}

/// Map a file extension onto a document kind.
pub fn detect_kind(path: &Path) -> Result<DocumentKind> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("md") | Some("markdown") => Ok(DocumentKind::Markdown),
        Some("json") => Ok(DocumentKind::JsonBlocks),
        other => Err(Error::Validation(format!(
            "unsupported file kind '{}': expected .md, .markdown or .json",
            other.unwrap_or("")
        ))),
    }
}

/// Stable document id for a file: its name.
pub fn file_doc_id(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_embed::HashedEmbedder;
    use quarry_store::SqliteVectorStore;

    fn test_setup(dim: usize) -> (Indexer, Arc<dyn VectorStore>, RagConfig, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::open(dir.path(), "test", dim).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new("hashed-v1", dim));
        let indexer = Indexer::new(embedder, store.clone());
        let config = RagConfig {
            chunk_size: 200,
            chunk_overlap: 0,
            min_chunk_size: 50,
            embedding_dimension: dim,
            ..Default::default()
        };
        (indexer, store, config, dir)
    }

    fn two_section_doc() -> &'static str {
        "# Intro\nRAG combines retrieval with generation.\n\n# Details\nIt reduces hallucinations."
    }

    #[tokio::test]
    async fn index_reports_chunks_and_bytes() {
        let (indexer, store, config, _dir) = test_setup(64);
        let report = indexer
            .index_document(&config, "doc.md", two_section_doc(), DocumentKind::Markdown, false)
            .await
            .unwrap();

        assert_eq!(report.chunks_created, 2);
        assert_eq!(report.bytes_in, two_section_doc().len());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn reindex_is_idempotent() {
        let (indexer, store, config, _dir) = test_setup(64);
        for _ in 0..2 {
            indexer
                .index_document(&config, "doc.md", two_section_doc(), DocumentKind::Markdown, false)
                .await
                .unwrap();
        }
        assert_eq!(store.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn reindex_with_new_content_replaces_old_chunks() {
        let (indexer, store, config, _dir) = test_setup(64);
        indexer
            .index_document(&config, "doc.md", two_section_doc(), DocumentKind::Markdown, false)
            .await
            .unwrap();
        indexer
            .index_document(
                &config,
                "doc.md",
                "# Fresh\nEntirely new content replaces the old chunks.",
                DocumentKind::Markdown,
                false,
            )
            .await
            .unwrap();

        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_existing_empties_the_collection_first() {
        let (indexer, store, config, _dir) = test_setup(64);
        indexer
            .index_document(&config, "a.md", two_section_doc(), DocumentKind::Markdown, false)
            .await
            .unwrap();
        indexer
            .index_document(
                &config,
                "b.md",
                "# Other\nA different document entirely.",
                DocumentKind::Markdown,
                true,
            )
            .await
            .unwrap();

        // Only b.md remains.
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_leaves_store_untouched() {
        let (_indexer, store, config, _dir) = test_setup(64);
        // An embedder whose dimension disagrees with the collection.
        let wrong: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new("hashed-v1", 128));
        let indexer = Indexer::new(wrong, store.clone());

        let err = indexer
            .index_document(&config, "doc.md", two_section_doc(), DocumentKind::Markdown, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 64, got: 128 }));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_distinct_documents_both_land() {
        let (indexer, store, config, _dir) = test_setup(64);
        let indexer = Arc::new(indexer);

        let mut a_text = String::from("# Alpha\n\n");
        let mut b_text = String::from("# Beta\n\n");
        for i in 0..120 {
            a_text.push_str(&format!("Alpha sentence {} about storage engines and caching. ", i));
            b_text.push_str(&format!("Beta sentence {} about network protocols and codecs. ", i));
        }

        let (ia, ib) = (indexer.clone(), indexer.clone());
        let (ca, cb) = (config.clone(), config.clone());
        let a = tokio::spawn(async move {
            ia.index_document(&ca, "a.md", &a_text, DocumentKind::Markdown, false)
                .await
        });
        let b = tokio::spawn(async move {
            ib.index_document(&cb, "b.md", &b_text, DocumentKind::Markdown, false)
                .await
        });

        let ra = a.await.unwrap().unwrap();
        let rb = b.await.unwrap().unwrap();
        assert_eq!(
            store.count().unwrap(),
            (ra.chunks_created + rb.chunks_created) as u64
        );
    }

    #[tokio::test]
    async fn directory_walk_indexes_supported_files() {
        let (indexer, store, config, _store_dir) = test_setup(64);
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.md"), two_section_doc()).unwrap();
        std::fs::write(
            dir.path().join("two.json"),
            r#"[{"text": "A block about sensor calibration."}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("skip.txt"), "ignored").unwrap();

        let report = indexer
            .index_directory(&config, dir.path(), false)
            .await
            .unwrap();

        assert_eq!(report.total_files, 2);
        assert_eq!(report.indexed_files, 2);
        assert!(report.errors.is_empty());
        assert_eq!(store.count().unwrap(), report.total_chunks as u64);
    }

    #[test]
    fn kind_detection_by_extension() {
        use std::path::PathBuf;
        assert_eq!(
            detect_kind(&PathBuf::from("x.md")).unwrap(),
            DocumentKind::Markdown
        );
        assert_eq!(
            detect_kind(&PathBuf::from("x.JSON")).unwrap(),
            DocumentKind::JsonBlocks
        );
        assert!(detect_kind(&PathBuf::from("x.pdf")).is_err());
    }
}
