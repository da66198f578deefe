//! Index and clear routes.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::time::timeout;
use tracing::info;

use super::{ApiError, INDEX_DEADLINE};
use crate::state::AppState;
use quarry_core::Error;
use quarry_ingest::{detect_kind, file_doc_id};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/index", post(index_document))
        .route("/clear", post(clear_index))
}

#[derive(Deserialize)]
struct IndexRequest {
    file_path: String,
    #[serde(default)]
    clear_existing: bool,
}

/// POST /api/rag/index — read a converter output file and index it.
async fn index_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let config = state.config.get();
    if !config.enabled {
        return Err(ApiError::Disabled);
    }

    let path = PathBuf::from(&req.file_path);
    if !path.is_file() {
        return Err(Error::NotFound(format!("file not found: {}", path.display())).into());
    }
    let kind = detect_kind(&path)?;
    let text = std::fs::read_to_string(&path).map_err(Error::from)?;
    let doc_id = file_doc_id(&path);

    let report = timeout(
        INDEX_DEADLINE,
        state
            .indexer
            .index_document(&config, &doc_id, &text, kind, req.clear_existing),
    )
    .await
    .map_err(|_| ApiError::DeadlineExceeded("index"))??;

    Ok(Json(serde_json::json!({
        "status": "success",
        "filename": report.doc_id,
        "chunks_created": report.chunks_created,
        "message": format!(
            "indexed {} chunks from {} in {} ms",
            report.chunks_created, report.doc_id, report.elapsed_ms
        ),
    })))
}

/// POST /api/rag/clear — drop every chunk, keep the collection.
async fn clear_index(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.clear()?;
    info!("index cleared by request");
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "Index cleared",
    })))
}
