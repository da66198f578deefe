//! Stats route.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use super::ApiError;
use crate::state::AppState;
use quarry_core::TOKEN_ESTIMATOR;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/stats", get(get_stats))
}

/// GET /api/rag/stats — collection, embedder and config snapshot.
async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let config = state.config.get();
    let store_stats = state.store.stats()?;

    Ok(Json(serde_json::json!({
        "vector_store": store_stats,
        "embedding_model": {
            "model_name": state.embedder.model_id(),
            "embedding_dimension": state.embedder.dim(),
            "device": state.embedder.device(),
        },
        "config": &*config,
        "token_estimator": TOKEN_ESTIMATOR,
    })))
}
