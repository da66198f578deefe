//! Quarry Core — error taxonomy and runtime configuration.

pub mod config;
pub mod error;

pub use config::{ConfigHandle, ConfigPatch, RagConfig, PROMPT_VERSION, TOKEN_ESTIMATOR};
pub use error::{Error, Result};
