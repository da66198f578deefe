//! Data types for stored chunks and search results.

use serde::{Deserialize, Serialize};

/// Metadata carried by every chunk. The field set is fixed; converters
/// producing extra keys have them rejected at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkMetadata {
    /// Nearest enclosing heading at the chunk's start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    /// Ancestor headings from the document root down to `heading`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub section_path: Vec<String>,
    /// Earliest page number seen inside the chunk, when the source has pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Total chunks produced for the owning document.
    pub total_chunks: u32,
}

/// A chunk row as persisted: identity, text, metadata and embedding.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Deterministic id derived from (doc_id, chunk_index, content hash).
    pub id: String,
    pub doc_id: String,
    /// 0-based position within the document.
    pub chunk_index: u32,
    pub text: String,
    pub token_estimate: u32,
    pub metadata: ChunkMetadata,
    /// L2-normalized vector of the collection's dimension.
    pub embedding: Vec<f32>,
}

/// A search result row.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHit {
    pub chunk_id: String,
    pub doc_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity clamped to [0, 1].
    pub similarity: f64,
}

/// Narrowing applied during search.
#[derive(Debug, Clone)]
pub enum SearchFilter {
    /// Only chunks of this document.
    Doc(String),
}

/// Selector for bulk deletion.
#[derive(Debug, Clone)]
pub enum DeleteFilter {
    /// All chunks of one document.
    Doc(String),
    /// An explicit id set.
    Ids(Vec<String>),
}

/// Collection-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub collection_name: String,
    /// Number of stored chunk rows.
    pub document_count: u64,
    pub embedding_dimension: usize,
    pub db_path: String,
}
