//! Response-shape tests — validates that the JSON bodies the handlers
//! produce keep the field names and types the HTTP surface documents.

use quarry_core::RagConfig;
use quarry_query::{QueryResult, Source};

/// QueryResult serializes with the documented field set.
#[test]
fn query_result_shape() {
    let result = QueryResult {
        query: "What does RAG reduce?".into(),
        answer: "It reduces hallucinations.".into(),
        sources: vec![Source {
            doc_id: "doc.md".into(),
            chunk_index: 1,
            heading: Some("Details".into()),
            similarity: 0.82,
            excerpt: "It reduces hallucinations.".into(),
        }],
        model_id: "gemma2:2b".into(),
        tokens_generated: 42,
        confidence: 0.82,
        retrieved_chunks: None,
    };

    let json = serde_json::to_value(&result).unwrap();
    assert!(json["query"].is_string());
    assert!(json["answer"].is_string());
    assert!(json["sources"].is_array());
    assert!(json["model_id"].is_string());
    assert!(json["tokens_generated"].is_number());
    assert!(json["confidence"].is_number());
    // Absent when chunks were not requested.
    assert!(json.get("retrieved_chunks").is_none());

    let source = &json["sources"][0];
    assert!(source["doc_id"].is_string());
    assert!(source["chunk_index"].is_number());
    assert!(source["heading"].is_string());
    assert!(source["similarity"].is_number());
    assert!(source["excerpt"].is_string());
}

/// The config snapshot exposes every documented option.
#[test]
fn config_snapshot_shape() {
    let json = serde_json::to_value(RagConfig::default()).unwrap();
    for field in [
        "enabled",
        "chunk_size",
        "chunk_overlap",
        "min_chunk_size",
        "embed_batch_size",
        "embedding_model",
        "embedding_dimension",
        "vector_db_path",
        "collection_name",
        "top_k",
        "similarity_threshold",
        "generator_endpoint",
        "generator_model",
        "temperature",
        "max_tokens",
        "context_window",
        "context_chunk_chars",
        "prompt_version",
    ] {
        assert!(
            json.get(field).is_some(),
            "config snapshot is missing '{}'",
            field
        );
    }
}

/// Health response fields the frontend polls.
#[test]
fn health_response_shape() {
    let health = serde_json::json!({
        "rag_enabled": true,
        "embeddings_model_available": true,
        "vector_store_ready": true,
        "generator_available": false,
        "message": "components unavailable: generator",
    });

    assert!(health["rag_enabled"].is_boolean());
    assert!(health["embeddings_model_available"].is_boolean());
    assert!(health["vector_store_ready"].is_boolean());
    assert!(health["generator_available"].is_boolean());
    assert!(health["message"].is_string());
}

/// Stats response nests store, embedder and config sections.
#[test]
fn stats_response_shape() {
    let stats = serde_json::json!({
        "vector_store": {
            "collection_name": "quarry_documents",
            "document_count": 12,
            "embedding_dimension": 384,
            "db_path": "/data/quarry/index/quarry.db",
        },
        "embedding_model": {
            "model_name": "hashed-v1",
            "embedding_dimension": 384,
            "device": "local",
        },
        "config": serde_json::to_value(RagConfig::default()).unwrap(),
        "token_estimator": "whitespace-punct-v1",
    });

    assert!(stats["vector_store"]["collection_name"].is_string());
    assert!(stats["vector_store"]["document_count"].is_number());
    assert!(stats["vector_store"]["db_path"].is_string());
    assert!(stats["embedding_model"]["model_name"].is_string());
    assert!(stats["embedding_model"]["embedding_dimension"].is_number());
    assert!(stats["embedding_model"]["device"].is_string());
    assert!(stats["config"].is_object());
}

/// Index and clear responses.
#[test]
fn index_and_clear_response_shapes() {
    let index = serde_json::json!({
        "status": "success",
        "filename": "doc.md",
        "chunks_created": 2,
        "message": "indexed 2 chunks from doc.md in 14 ms",
    });
    assert!(index["status"].is_string());
    assert!(index["filename"].is_string());
    assert!(index["chunks_created"].is_number());
    assert!(index["message"].is_string());

    let clear = serde_json::json!({
        "status": "success",
        "message": "Index cleared",
    });
    assert!(clear["status"].is_string());
    assert!(clear["message"].is_string());
}

/// Error bodies always carry a single `detail` string.
#[test]
fn error_body_shape() {
    let error = serde_json::json!({
        "detail": "dimension mismatch: collection expects 384, got 768 (rebuild required)",
    });
    assert!(error["detail"].is_string());
    assert_eq!(error.as_object().unwrap().len(), 1);
}
