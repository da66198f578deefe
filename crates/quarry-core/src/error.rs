//! Error types for Quarry.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("immutable field: '{0}' cannot be changed at runtime (rebuild required)")]
    ImmutableField(String),

    #[error("dimension mismatch: collection expects {expected}, got {got} (rebuild required)")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("backend unavailable: {backend}: {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("model missing: '{0}' is not loaded on the generator backend (pull it first)")]
    ModelMissing(String),

    #[error("empty document: no tokens produced")]
    EmptyDocument,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short label for the error kind, used in log fields and health output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::ImmutableField(_) => "immutable_field",
            Error::DimensionMismatch { .. } => "dimension_mismatch",
            Error::BackendUnavailable { .. } => "backend_unavailable",
            Error::ModelMissing(_) => "model_missing",
            Error::EmptyDocument => "empty_document",
            Error::Storage(_) => "storage",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Internal(_) => "internal",
        }
    }

    /// Convenience constructor for backend failures.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
