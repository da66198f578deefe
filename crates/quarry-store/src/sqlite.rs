//! SQLite-backed vector store with an in-memory cosine matrix.
//!
//! Chunk rows live in a single SQLite file under the storage root. Search
//! runs against a row-normalized embedding matrix kept in memory and
//! reloaded lazily after any mutation.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::schema::SCHEMA_SQL;
use crate::types::*;
use crate::vector::{decode_f32, encode_f32};
use crate::VectorStore;
use quarry_core::{Error, Result};

/// File name of the collection database inside the index directory.
const DB_FILE: &str = "quarry.db";

pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    collection_name: String,
    dim: usize,
    matrix: Mutex<SimilarityMatrix>,
}

/// Pre-loaded normalized embeddings, shape (N, dim), plus per-row identity
/// used for deterministic tie-breaks.
struct SimilarityMatrix {
    matrix: Array2<f32>,
    rows: Vec<RowKey>,
    dirty: bool,
}

#[derive(Clone)]
struct RowKey {
    chunk_id: String,
    doc_id: String,
    chunk_index: u32,
}

impl SqliteVectorStore {
    /// Open or create the collection under `index_dir`.
    ///
    /// The dimension recorded at creation wins over `dim` on reopen; the
    /// collection's dimensionality is fixed for its lifetime.
    pub fn open(index_dir: impl AsRef<Path>, collection_name: &str, dim: usize) -> Result<Self> {
        let index_dir = index_dir.as_ref();
        std::fs::create_dir_all(index_dir)?;
        let db_path = index_dir.join(DB_FILE);

        let conn = Self::create_connection(&db_path)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Storage(format!("schema init failed: {}", e)))?;

        let stored: Option<(String, usize)> = conn
            .prepare("SELECT name, dimension FROM collection_meta WHERE id = 1")
            .map_err(|e| Error::Storage(e.to_string()))?
            .query_row([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;

        let (collection_name, dim) = match stored {
            Some((name, stored_dim)) => (name, stored_dim),
            None => {
                conn.execute(
                    "INSERT INTO collection_meta (id, name, dimension) VALUES (1, ?1, ?2)",
                    params![collection_name, dim as i64],
                )
                .map_err(|e| Error::Storage(e.to_string()))?;
                (collection_name.to_string(), dim)
            }
        };

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            collection_name,
            dim,
            matrix: Mutex::new(SimilarityMatrix {
                matrix: Array2::zeros((0, dim)),
                rows: Vec::new(),
                dirty: true,
            }),
        };

        let count = store.count()?;
        info!(
            "collection '{}' opened: {} chunks, dim={}, path={}",
            store.collection_name,
            count,
            store.dim,
            store.db_path.display()
        );
        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Storage(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16384;",
        )
        .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(conn)
    }

    fn check_dim(&self, len: usize) -> Result<()> {
        if len != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                got: len,
            });
        }
        Ok(())
    }

    /// Reload the similarity matrix from the database.
    fn load_matrix(&self) -> Result<()> {
        let mut rows: Vec<RowKey> = Vec::new();
        let mut embeddings: Vec<Array1<f32>> = Vec::new();

        {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(
                    "SELECT id, doc_id, chunk_index, embedding FROM chunks ORDER BY seq",
                )
                .map_err(|e| Error::Storage(e.to_string()))?;
            let mapped = stmt
                .query_map([], |row| {
                    let blob: Vec<u8> = row.get(3)?;
                    Ok((
                        RowKey {
                            chunk_id: row.get(0)?,
                            doc_id: row.get(1)?,
                            chunk_index: row.get::<_, i64>(2)? as u32,
                        },
                        blob,
                    ))
                })
                .map_err(|e| Error::Storage(e.to_string()))?;

            for entry in mapped {
                let (key, blob) = entry.map_err(|e| Error::Storage(e.to_string()))?;
                rows.push(key);
                embeddings.push(decode_f32(&blob));
            }
        }

        let mut mat = self.matrix.lock();
        if embeddings.is_empty() {
            mat.matrix = Array2::zeros((0, self.dim));
            mat.rows = Vec::new();
            mat.dirty = false;
            return Ok(());
        }

        let mut matrix = Array2::zeros((embeddings.len(), self.dim));
        for (i, emb) in embeddings.iter().enumerate() {
            matrix.row_mut(i).assign(emb);
        }
        // Rows are stored normalized; renormalize anyway so cosine stays a
        // plain dot product even for legacy rows.
        for mut row in matrix.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 1e-9 {
                row /= norm;
            }
        }

        debug!("similarity matrix loaded: {} rows", embeddings.len());
        mat.matrix = matrix;
        mat.rows = rows;
        mat.dirty = false;
        Ok(())
    }

    fn ensure_matrix(&self) -> Result<()> {
        if self.matrix.lock().dirty {
            self.load_matrix()?;
        }
        Ok(())
    }

    fn fetch_hit(&self, chunk_id: &str, similarity: f64) -> Result<Option<StoreHit>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached(
                "SELECT doc_id, chunk_index, text, metadata_json FROM chunks WHERE id = ?1",
            )
            .map_err(|e| Error::Storage(e.to_string()))?
            .query_row(params![chunk_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as u32,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(row.map(|(doc_id, chunk_index, text, meta_json)| StoreHit {
            chunk_id: chunk_id.to_string(),
            doc_id,
            chunk_index,
            text,
            metadata: serde_json::from_str(&meta_json).unwrap_or_default(),
            similarity,
        }))
    }
}

impl VectorStore for SqliteVectorStore {
    /// Insert or replace by id, transactionally. Re-upserting an id keeps
    /// its original insertion sequence so tie-breaks stay stable.
    fn upsert(&self, entries: &[ChunkRecord]) -> Result<usize> {
        for entry in entries {
            self.check_dim(entry.embedding.len())?;
        }
        if entries.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut next_seq: i64 = tx
            .query_row("SELECT COALESCE(MAX(seq), 0) FROM chunks", [], |row| {
                row.get(0)
            })
            .map_err(|e| Error::Storage(e.to_string()))?;

        for entry in entries {
            let existing_seq: Option<i64> = tx
                .prepare_cached("SELECT seq FROM chunks WHERE id = ?1")
                .map_err(|e| Error::Storage(e.to_string()))?
                .query_row(params![entry.id], |row| row.get(0))
                .optional()
                .map_err(|e| Error::Storage(e.to_string()))?;

            let seq = existing_seq.unwrap_or_else(|| {
                next_seq += 1;
                next_seq
            });

            let meta_json = serde_json::to_string(&entry.metadata)?;
            tx.prepare_cached(
                "INSERT OR REPLACE INTO chunks \
                 (id, doc_id, chunk_index, text, token_estimate, metadata_json, embedding, seq) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(|e| Error::Storage(e.to_string()))?
            .execute(params![
                entry.id,
                entry.doc_id,
                entry.chunk_index as i64,
                entry.text,
                entry.token_estimate as i64,
                meta_json,
                encode_f32(&entry.embedding),
                seq,
            ])
            .map_err(|e| Error::Storage(e.to_string()))?;
        }

        tx.commit().map_err(|e| Error::Storage(e.to_string()))?;
        drop(conn);

        self.matrix.lock().dirty = true;
        Ok(entries.len())
    }

    fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<StoreHit>> {
        self.check_dim(vector.len())?;
        self.ensure_matrix()?;

        let scored: Vec<(RowKey, f64)> = {
            let mat = self.matrix.lock();
            if mat.matrix.nrows() == 0 {
                return Ok(Vec::new());
            }

            let mut query = Array1::from_vec(vector.to_vec());
            let norm = query.dot(&query).sqrt();
            if norm < 1e-9 {
                return Ok(Vec::new());
            }
            query /= norm;

            let similarities = mat.matrix.dot(&query);

            let mut scored: Vec<(RowKey, f64)> = similarities
                .iter()
                .enumerate()
                .filter(|(i, _)| match filter {
                    Some(SearchFilter::Doc(doc_id)) => mat.rows[*i].doc_id == *doc_id,
                    None => true,
                })
                .map(|(i, &sim)| (mat.rows[i].clone(), (sim as f64).clamp(0.0, 1.0)))
                .collect();

            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.0.doc_id.cmp(&b.0.doc_id))
                    .then_with(|| a.0.chunk_index.cmp(&b.0.chunk_index))
            });
            scored.truncate(top_k);
            scored
        };

        let mut hits = Vec::with_capacity(scored.len());
        for (key, similarity) in scored {
            if let Some(hit) = self.fetch_hit(&key.chunk_id, similarity)? {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    fn delete(&self, filter: &DeleteFilter) -> Result<usize> {
        let deleted = {
            let conn = self.conn.lock();
            match filter {
                DeleteFilter::Doc(doc_id) => conn
                    .execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc_id])
                    .map_err(|e| Error::Storage(e.to_string()))?,
                DeleteFilter::Ids(ids) => {
                    let mut total = 0;
                    let mut stmt = conn
                        .prepare_cached("DELETE FROM chunks WHERE id = ?1")
                        .map_err(|e| Error::Storage(e.to_string()))?;
                    for id in ids {
                        total += stmt
                            .execute(params![id])
                            .map_err(|e| Error::Storage(e.to_string()))?;
                    }
                    total
                }
            }
        };

        if deleted > 0 {
            self.matrix.lock().dirty = true;
            debug!("deleted {} chunks", deleted);
        }
        Ok(deleted)
    }

    /// Remove every chunk; the storage location itself is retained.
    fn clear(&self) -> Result<()> {
        {
            let conn = self.conn.lock();
            conn.execute("DELETE FROM chunks", [])
                .map_err(|e| Error::Storage(e.to_string()))?;
        }
        let mut mat = self.matrix.lock();
        mat.matrix = Array2::zeros((0, self.dim));
        mat.rows = Vec::new();
        mat.dirty = false;
        info!("collection '{}' cleared", self.collection_name);
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(count as u64)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            collection_name: self.collection_name.clone(),
            document_count: self.count()?,
            embedding_dimension: self.dim,
            db_path: self.db_path.to_string_lossy().to_string(),
        })
    }
}
