//! Quarry Ingest — block segmentation, chunking and the indexing pipeline.

pub mod blocks;
pub mod chunker;
pub mod indexer;

pub use chunker::{chunk_id, token_estimate, Chunker, DocumentChunk, DocumentKind};
pub use indexer::{detect_kind, file_doc_id, DirectoryReport, IndexReport, Indexer};
