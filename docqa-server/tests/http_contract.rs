use std::sync::Arc;

use async_trait::async_trait;
use docqa_rag::{
    GENERATION_ERROR_RESPONSE, GenerationBackend, GenerationOptions, Generator,
    HashEmbeddingProvider, InMemoryVectorStore, RagConfig, RagError, RagPipeline, Result,
};
use docqa_server::{AppState, app_router};
use reqwest::StatusCode;
use serde_json::{Value, json};

struct FixedAnswer;

#[async_trait]
impl GenerationBackend for FixedAnswer {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        Ok("Alpha comes first.".to_string())
    }
}

struct Unreachable;

#[async_trait]
impl GenerationBackend for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn complete(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        Err(RagError::BackendUnavailable {
            backend: "unreachable".to_string(),
            message: "connection refused".to_string(),
        })
    }
}

async fn spawn_server(backend: Arc<dyn GenerationBackend>) -> (String, tokio::task::JoinHandle<()>) {
    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().chunk_size(10).chunk_overlap(2).build().unwrap())
        .embedding_provider(Arc::new(HashEmbeddingProvider::new(256)))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .generator(Generator::with_backend(backend))
        .build()
        .expect("pipeline");
    let app = app_router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (format!("http://{}", addr), handle)
}

fn greek_corpus() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("greek.txt"), "Alpha. Beta. Gamma.").expect("write corpus");
    dir
}

#[tokio::test]
async fn health_reports_healthy() {
    let (base, handle) = spawn_server(Arc::new(FixedAnswer)).await;

    let response = reqwest::get(format!("{}/health", base)).await.expect("health response");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("health json");
    assert_eq!(body, json!({"status": "healthy"}));

    handle.abort();
}

#[tokio::test]
async fn index_then_query_returns_sources() {
    let (base, handle) = spawn_server(Arc::new(FixedAnswer)).await;
    let client = reqwest::Client::new();
    let corpus = greek_corpus();

    let index = client
        .post(format!("{}/index", base))
        .json(&json!({"document_path": corpus.path()}))
        .send()
        .await
        .expect("index response");
    assert_eq!(index.status(), StatusCode::OK);
    let body: Value = index.json().await.expect("index json");
    assert_eq!(body["status"], "success");
    assert!(body["message"].as_str().is_some_and(|m| m.contains("documents")));

    let query = client
        .post(format!("{}/query", base))
        .json(&json!({"query": "Alpha", "n_results": 2}))
        .send()
        .await
        .expect("query response");
    assert_eq!(query.status(), StatusCode::OK);
    let body: Value = query.json().await.expect("query json");
    assert_eq!(body["query"], "Alpha");
    assert_eq!(body["response"], "Alpha comes first.");
    assert_eq!(body["num_sources"], 2);
    let sources = body["source_documents"].as_array().expect("source_documents array");
    assert_eq!(sources.len(), 2);
    assert!(sources[0].as_str().is_some_and(|s| s.contains("Alpha")));

    handle.abort();
}

#[tokio::test]
async fn index_validates_its_input() {
    let (base, handle) = spawn_server(Arc::new(FixedAnswer)).await;
    let client = reqwest::Client::new();

    let missing = client
        .post(format!("{}/index", base))
        .json(&json!({"collection_name": "documents"}))
        .send()
        .await
        .expect("index response");
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let body: Value = missing.json().await.expect("error json");
    assert_eq!(body["error"], "document_path is required");

    let dir = tempfile::tempdir().expect("tempdir");
    let nonexistent = client
        .post(format!("{}/index", base))
        .json(&json!({"document_path": dir.path().join("absent")}))
        .send()
        .await
        .expect("index response");
    assert_eq!(nonexistent.status(), StatusCode::NOT_FOUND);
    let body: Value = nonexistent.json().await.expect("error json");
    assert!(body["error"].as_str().is_some_and(|e| e.contains("not found")));

    let bad_collection = client
        .post(format!("{}/index", base))
        .json(&json!({"document_path": dir.path(), "collection_name": "../escape"}))
        .send()
        .await
        .expect("index response");
    assert_eq!(bad_collection.status(), StatusCode::BAD_REQUEST);

    handle.abort();
}

#[tokio::test]
async fn query_validates_its_input() {
    let (base, handle) = spawn_server(Arc::new(FixedAnswer)).await;
    let client = reqwest::Client::new();

    let missing = client
        .post(format!("{}/query", base))
        .json(&json!({"collection_name": "documents"}))
        .send()
        .await
        .expect("query response");
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let body: Value = missing.json().await.expect("error json");
    assert_eq!(body["error"], "query is required");

    let zero = client
        .post(format!("{}/query", base))
        .json(&json!({"query": "Alpha", "n_results": 0}))
        .send()
        .await
        .expect("query response");
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    let malformed = client
        .post(format!("{}/query", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("query response");
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    let body: Value = malformed.json().await.expect("error json");
    assert!(body.get("error").is_some());

    handle.abort();
}

#[tokio::test]
async fn query_on_empty_collection_succeeds() {
    let (base, handle) = spawn_server(Arc::new(FixedAnswer)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/query", base))
        .json(&json!({"query": "anything?", "collection_name": "fresh"}))
        .send()
        .await
        .expect("query response");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("query json");
    assert_eq!(body["num_sources"], 0);
    assert_eq!(body["source_documents"], json!([]));

    handle.abort();
}

#[tokio::test]
async fn generation_outage_degrades_instead_of_failing() {
    let (base, handle) = spawn_server(Arc::new(Unreachable)).await;
    let client = reqwest::Client::new();
    let corpus = greek_corpus();

    client
        .post(format!("{}/index", base))
        .json(&json!({"document_path": corpus.path()}))
        .send()
        .await
        .expect("index response");

    let response = client
        .post(format!("{}/query", base))
        .json(&json!({"query": "Gamma"}))
        .send()
        .await
        .expect("query response");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("query json");
    assert_eq!(body["response"], GENERATION_ERROR_RESPONSE);
    assert_eq!(body["num_sources"], 3);

    handle.abort();
}
