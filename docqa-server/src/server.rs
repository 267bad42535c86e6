use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, post},
};
use docqa_rag::{FileVectorStore, Generator, RagPipeline};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::protocol::{
    ApiError, HealthResponse, IndexRequest, IndexResponse, QueryRequest, QueryResponse,
};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
}

impl AppState {
    pub fn new(pipeline: RagPipeline) -> Self {
        Self { pipeline: Arc::new(pipeline) }
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/index", post(index_documents))
        .route("/query", post(query))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Construct every pipeline component described by `config`.
///
/// Fails if the embedding model cannot be resolved, the generation backend
/// cannot be constructed or the vector store directory is unusable.
pub async fn build_pipeline(config: &ServiceConfig) -> anyhow::Result<RagPipeline> {
    let embedding_provider = config
        .embedding_model
        .load(&config.embedding_endpoints)
        .await
        .with_context(|| format!("failed to load embedding model '{}'", config.embedding_model))?;

    let generator = Generator::from_config(&config.backend, config.timeout)
        .context("failed to configure generation backend")?;

    let store = FileVectorStore::open(&config.vector_db_path).await.with_context(|| {
        format!("failed to open vector store at {}", config.vector_db_path.display())
    })?;

    let pipeline = RagPipeline::builder()
        .config(config.rag.clone())
        .embedding_provider(embedding_provider)
        .vector_store(Arc::new(store))
        .generator(generator)
        .build()?;
    Ok(pipeline)
}

pub async fn run_server(config: ServiceConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for docqa server")?;

    let pipeline = build_pipeline(&config).await?;
    let app = app_router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, embedding_model = %config.embedding_model, "docqa server listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("docqa server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy".to_string() })
}

async fn index_documents(
    State(state): State<AppState>,
    payload: Result<Json<IndexRequest>, JsonRejection>,
) -> Result<Json<IndexResponse>, ApiError> {
    let Json(request) = payload?;
    let path = request
        .document_path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("document_path is required"))?;

    let report = state.pipeline.index_path(&path, &request.collection_name).await?;
    Ok(Json(IndexResponse {
        status: "success".to_string(),
        message: format!(
            "Indexed {} chunks from {} documents at {path} into '{}'",
            report.chunks, report.documents, request.collection_name
        ),
    }))
}

async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload?;
    let question = request
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("query is required"))?;

    let n_results = request.n_results.unwrap_or(state.pipeline.config().top_k);
    let result = state.pipeline.query(&question, &request.collection_name, n_results).await?;
    Ok(Json(result))
}
