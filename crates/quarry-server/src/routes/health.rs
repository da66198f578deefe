//! Health route.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::time::timeout;

use super::HEALTH_DEADLINE;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

/// GET /api/rag/health — synchronous component checks.
async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = state.config.get();

    let embeddings_ok = state.embedder.dim() > 0 && state.embedder.dim() == state.store.dim();
    let store_ready = state.store.count().is_ok();
    let generator = state.generator(&config);
    let generator_ok = timeout(HEALTH_DEADLINE, generator.healthy())
        .await
        .unwrap_or(false);

    let message = if embeddings_ok && store_ready && generator_ok {
        "RAG system operational".to_string()
    } else {
        let mut degraded = Vec::new();
        if !embeddings_ok {
            degraded.push("embedder");
        }
        if !store_ready {
            degraded.push("vector store");
        }
        if !generator_ok {
            degraded.push("generator");
        }
        format!("components unavailable: {}", degraded.join(", "))
    };

    Json(serde_json::json!({
        "rag_enabled": config.enabled,
        "embeddings_model_available": embeddings_ok,
        "vector_store_ready": store_ready,
        "generator_available": generator_ok,
        "message": message,
    }))
}
