//! Request and response bodies of the HTTP API.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docqa_rag::{ErrorKind, RagError};
use serde::{Deserialize, Serialize};

pub use docqa_rag::QueryResult as QueryResponse;

/// Collection used when a request names none.
pub const DEFAULT_COLLECTION: &str = "documents";

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

/// Body of `POST /index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequest {
    /// File or directory to index. Required.
    #[serde(default)]
    pub document_path: Option<String>,
    /// Target collection.
    #[serde(default = "default_collection")]
    pub collection_name: String,
}

/// Body of `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Question to answer. Required.
    #[serde(default)]
    pub query: Option<String>,
    /// Collection to search.
    #[serde(default = "default_collection")]
    pub collection_name: String,
    /// Number of sources to retrieve; the pipeline's `top_k` (5 by default) when absent.
    #[serde(default)]
    pub n_results: Option<usize>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

/// Successful `POST /index` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexResponse {
    pub status: String,
    pub message: String,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

/// An error returned to an HTTP caller as `{"error": message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::InvalidInput => Self::bad_request(message),
            ErrorKind::NotFound => Self::not_found(message),
            ErrorKind::Configuration | ErrorKind::Invariant | ErrorKind::Backend => {
                Self::internal(message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use docqa_rag::PipelineStage;

    use super::*;

    #[test]
    fn request_defaults_are_explicit() {
        let index: IndexRequest = serde_json::from_str(r#"{"document_path": "docs"}"#).unwrap();
        assert_eq!(index.document_path.as_deref(), Some("docs"));
        assert_eq!(index.collection_name, "documents");

        let query: QueryRequest = serde_json::from_str("{}").unwrap();
        assert!(query.query.is_none());
        assert_eq!(query.collection_name, "documents");
        assert_eq!(query.n_results, None);

        assert!(serde_json::from_str::<QueryRequest>(r#"{"query": "q", "n_results": -1}"#).is_err());
    }

    #[test]
    fn errors_map_to_status_codes() {
        let missing = RagError::PathNotFound(PathBuf::from("/nope")).in_stage(PipelineStage::Load);
        assert_eq!(ApiError::from(missing).status, StatusCode::NOT_FOUND);

        let invalid = RagError::InvalidInput("n_results must be at least 1".into());
        assert_eq!(ApiError::from(invalid).status, StatusCode::BAD_REQUEST);

        let mismatch = RagError::DimensionMismatch { collection: "d".into(), expected: 3, actual: 2 }
            .in_stage(PipelineStage::Insert);
        let api = ApiError::from(mismatch);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(api.message.starts_with("insert stage failed"));
    }
}
