//! Query route.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::time::timeout;

use super::{ApiError, QUERY_DEADLINE};
use crate::state::AppState;
use quarry_core::Error;
use quarry_query::{QueryOptions, QueryResult};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/query", post(query_documents))
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    top_k: Option<usize>,
    #[serde(default = "default_include_chunks")]
    include_chunks: bool,
    similarity_threshold: Option<f64>,
}

fn default_include_chunks() -> bool {
    true
}

/// POST /api/rag/query — answer a question from the indexed documents.
async fn query_documents(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResult>, ApiError> {
    let config = state.config.get();
    if !config.enabled {
        return Err(ApiError::Disabled);
    }

    if req.query.trim().is_empty() {
        return Err(Error::Validation("query must not be empty".into()).into());
    }
    if let Some(k) = req.top_k {
        if !(1..=20).contains(&k) {
            return Err(Error::Validation(format!("top_k must be in [1, 20], got {}", k)).into());
        }
    }
    if let Some(t) = req.similarity_threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(Error::Validation(format!(
                "similarity_threshold must be in [0, 1], got {}",
                t
            ))
            .into());
        }
    }

    let options = QueryOptions {
        top_k: req.top_k,
        include_chunks: req.include_chunks,
        similarity_threshold: req.similarity_threshold,
    };

    let orchestrator = state.orchestrator(&config);
    let result = timeout(
        QUERY_DEADLINE,
        orchestrator.answer(&config, &req.query, &options),
    )
    .await
    .map_err(|_| ApiError::DeadlineExceeded("query"))??;

    Ok(Json(result))
}
