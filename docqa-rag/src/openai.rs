//! OpenAI-compatible embedding provider using the `/embeddings` API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::embedding::{EmbeddingProvider, check_batch};
use crate::error::{RagError, Result};

/// The default OpenAI API base URL.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "OpenAI";

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// Uses `reqwest` to call `{base_url}/embeddings` directly. The dimension is
/// learned once at [`connect`](OpenAIEmbeddingProvider::connect) time.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::{OpenAIEmbeddingProvider, OPENAI_API_BASE};
///
/// let provider =
///     OpenAIEmbeddingProvider::connect(OPENAI_API_BASE, "sk-...", "text-embedding-3-small").await?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    model_id: String,
    dimensions: usize,
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAIEmbeddingProvider {
    /// Resolve `model` against the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] if the key is empty, the API is
    /// unreachable, or the model is rejected.
    pub async fn connect(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        Self::connect_with_timeout(base_url, api_key, model, Duration::from_secs(60)).await
    }

    /// Like [`connect`](Self::connect) with an explicit request timeout.
    pub async fn connect_with_timeout(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let model_id = format!("openai:{model}");
        if api_key.is_empty() {
            return Err(RagError::ModelLoad {
                model: model_id,
                message: "API key must not be empty".into(),
            });
        }

        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            RagError::ModelLoad { model: model_id.clone(), message: e.to_string() }
        })?;

        let mut provider = Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            model_id,
            dimensions: 0,
        };

        let probe = provider.request(&["dimension probe"]).await.map_err(|e| {
            error!(provider = PROVIDER, model, error = %e, "failed to resolve embedding model");
            RagError::ModelLoad { model: provider.model_id.clone(), message: e.to_string() }
        })?;
        provider.dimensions = probe.first().map(Vec::len).unwrap_or(0);
        if provider.dimensions == 0 {
            return Err(RagError::ModelLoad {
                model: provider.model_id.clone(),
                message: "API returned an empty embedding".into(),
            });
        }

        info!(provider = PROVIDER, model, dimensions = provider.dimensions, "loaded embedding model");
        Ok(provider)
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request_body = EmbeddingRequest { model: &self.model, input: texts.to_vec() };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| RagError::Embedding {
                provider: PROVIDER.into(),
                message: format!("request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(RagError::Embedding {
                provider: PROVIDER.into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let mut parsed: EmbeddingResponse =
            response.json().await.map_err(|e| RagError::Embedding {
                provider: PROVIDER.into(),
                message: format!("failed to parse response: {e}"),
            })?;

        // The API does not promise input order; `index` does.
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::Embedding {
            provider: PROVIDER.into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");
        let vectors = self.request(texts).await?;
        check_batch(PROVIDER, texts.len(), self.dimensions, &vectors)?;
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_api_key_is_rejected_before_any_request() {
        let result = OpenAIEmbeddingProvider::connect(OPENAI_API_BASE, "", "text-embedding-3-small").await;
        assert!(matches!(result, Err(RagError::ModelLoad { .. })));
    }
}
