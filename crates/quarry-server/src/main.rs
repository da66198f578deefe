//! Quarry — local RAG service over converter-produced documents.

use std::path::PathBuf;
use std::sync::Arc;

use quarry_store::VectorStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod routes;
mod state;

use state::AppState;

fn resolve_data_dir() -> PathBuf {
    std::env::var("QUARRY_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data/quarry"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_dir = resolve_data_dir();
    info!("data directory: {}", data_dir.display());

    // Load the saved snapshot, or start from defaults rooted at the data dir.
    let config_path = data_dir.join("config.json");
    let mut config = if config_path.is_file() {
        quarry_core::RagConfig::load(&config_path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", config_path.display(), e))?
    } else {
        quarry_core::RagConfig {
            vector_db_path: data_dir.clone(),
            ..Default::default()
        }
    };

    let embedder = quarry_embed::create_embedder(&config);
    config.embedding_dimension = embedder.dim();

    let store = quarry_store::SqliteVectorStore::open(
        config.vector_db_path.join("index"),
        &config.collection_name,
        embedder.dim(),
    )
    .map_err(|e| anyhow::anyhow!("failed to open vector store: {}", e))?;

    if store.dim() != embedder.dim() {
        warn!(
            "collection dimension {} does not match embedder dimension {}; indexing will fail until the collection is rebuilt",
            store.dim(),
            embedder.dim()
        );
    }

    if let Err(e) = config.save(&config_path) {
        warn!("failed to persist startup config: {}", e);
    }

    let state = Arc::new(AppState::new(config, embedder, Arc::new(store)));
    let app = routes::build_router(state);

    let port: u16 = std::env::var("QUARRY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("quarry listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
