//! Config routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tracing::warn;

use super::ApiError;
use crate::state::AppState;
use quarry_core::{ConfigPatch, Error};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/config", get(get_config).put(update_config))
}

/// GET /api/rag/config — the current snapshot.
async fn get_config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!(&*state.config.get()))
}

/// PUT /api/rag/config — apply a partial update, swap atomically, persist.
async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let patch: ConfigPatch = serde_json::from_value(body)
        .map_err(|e| Error::Validation(format!("unknown or invalid config field: {}", e)))?;

    let updated = state.config.update(&patch)?;

    // Persist best-effort; the in-memory swap already happened.
    if let Err(e) = updated.save(&updated.config_file()) {
        warn!("failed to persist config: {}", e);
    }

    Ok(Json(serde_json::json!(&*updated)))
}
