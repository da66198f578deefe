//! Quarry Store — persistent cosine-similarity index over chunk rows.
//!
//! The [`VectorStore`] trait is the only way other components touch
//! persisted chunks. The SQLite implementation owns the on-disk format.

pub mod schema;
pub mod sqlite;
pub mod types;
pub mod vector;

pub use sqlite::SqliteVectorStore;
pub use types::{ChunkMetadata, ChunkRecord, DeleteFilter, SearchFilter, StoreHit, StoreStats};

use quarry_core::Result;

/// Persistent store of `(id, vector, metadata, text)` rows under a single
/// collection with one fixed dimensionality and cosine similarity.
pub trait VectorStore: Send + Sync {
    /// Insert or replace entries by id. Rejects vectors whose length does
    /// not match the collection dimension before writing anything.
    fn upsert(&self, entries: &[ChunkRecord]) -> Result<usize>;

    /// Up to `top_k` hits, similarity descending, ties broken by
    /// `(doc_id, chunk_index)`. An empty collection yields an empty vec.
    fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<StoreHit>>;

    /// Bulk delete; returns the number of removed rows.
    fn delete(&self, filter: &DeleteFilter) -> Result<usize>;

    /// Remove all entries, keeping the storage location.
    fn clear(&self) -> Result<()>;

    fn count(&self) -> Result<u64>;

    /// The collection's fixed vector dimension.
    fn dim(&self) -> usize;

    fn stats(&self) -> Result<StoreStats>;
}
