//! HTTP route handlers for the `/api/rag` surface.

pub mod config;
pub mod health;
pub mod index;
pub mod query;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::state::AppState;
use quarry_core::Error;

/// Per-operation deadlines.
pub const INDEX_DEADLINE: Duration = Duration::from_secs(300);
pub const QUERY_DEADLINE: Duration = Duration::from_secs(120);
pub const HEALTH_DEADLINE: Duration = Duration::from_secs(5);

/// Build the main router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/rag", rag_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn rag_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(stats::routes())
        .merge(config::routes())
        .merge(index::routes())
        .merge(query::routes())
}

/// Error wrapper mapping the core taxonomy onto HTTP statuses. Every error
/// body is `{ "detail": "<message>" }`.
pub enum ApiError {
    Core(Error),
    /// The master switch is off.
    Disabled,
    /// The operation ran past its deadline.
    DeadlineExceeded(&'static str),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Disabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service is disabled; enable it via the config endpoint".to_string(),
            ),
            ApiError::DeadlineExceeded(op) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{} deadline exceeded", op),
            ),
            ApiError::Core(err) => {
                let status = match &err {
                    Error::Validation(_) | Error::ImmutableField(_) | Error::EmptyDocument => {
                        StatusCode::BAD_REQUEST
                    }
                    Error::NotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        };

        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
