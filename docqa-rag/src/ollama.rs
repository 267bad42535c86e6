//! Ollama embedding provider using the local `/api/embed` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::embedding::{EmbeddingProvider, check_batch};
use crate::error::{RagError, Result};

/// The default Ollama server address.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const PROVIDER: &str = "Ollama";

/// An [`EmbeddingProvider`] backed by an Ollama server.
///
/// The model is resolved once in [`connect`](OllamaEmbeddingProvider::connect),
/// which also learns the embedding dimension by embedding a probe string.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::connect("http://localhost:11434", "all-minilm").await?;
/// assert_eq!(provider.dimensions(), 384);
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    model_id: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaEmbeddingProvider {
    /// Resolve `model` on the Ollama server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] if the server is unreachable, does not
    /// know the model, or returns an empty embedding.
    pub async fn connect(base_url: &str, model: &str) -> Result<Self> {
        Self::connect_with_timeout(base_url, model, Duration::from_secs(60)).await
    }

    /// Like [`connect`](Self::connect) with an explicit request timeout.
    pub async fn connect_with_timeout(
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let model_id = format!("ollama:{model}");
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            RagError::ModelLoad { model: model_id.clone(), message: e.to_string() }
        })?;

        let mut provider = Self {
            client,
            endpoint: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
            model_id,
            dimensions: 0,
        };

        let probe = provider.request(&["dimension probe"]).await.map_err(|e| {
            error!(provider = PROVIDER, model, error = %e, "failed to resolve embedding model");
            RagError::ModelLoad { model: provider.model_id.clone(), message: e.to_string() }
        })?;
        let dimensions = probe.first().map(Vec::len).unwrap_or(0);
        if dimensions == 0 {
            return Err(RagError::ModelLoad {
                model: provider.model_id.clone(),
                message: "server returned an empty embedding".to_string(),
            });
        }

        provider.dimensions = dimensions;
        info!(provider = PROVIDER, model, dimensions, "loaded embedding model");
        Ok(provider)
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbedRequest { model: &self.model, input: texts.to_vec() };

        let response =
            self.client.post(&self.endpoint).json(&body).send().await.map_err(|e| {
                RagError::Embedding {
                    provider: PROVIDER.into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
            return Err(RagError::Embedding {
                provider: PROVIDER.into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| RagError::Embedding {
            provider: PROVIDER.into(),
            message: format!("failed to parse response: {e}"),
        })?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
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
