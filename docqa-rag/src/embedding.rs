//! Embedding provider trait for generating vector embeddings from text.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::hashing::HashEmbeddingProvider;
use crate::local::LocalModel;
use crate::ollama::{DEFAULT_OLLAMA_URL, OllamaEmbeddingProvider};
use crate::openai::{OPENAI_API_BASE, OpenAIEmbeddingProvider};

/// A provider that generates vector embeddings from text input.
///
/// Every vector produced by one provider has the same length,
/// [`dimensions`](EmbeddingProvider::dimensions), which is fixed when the
/// provider is constructed. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it. Batching must
/// not change results: `embed_batch(&[t])[0]` equals `embed(t)`.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{EmbeddingProvider, HashEmbeddingProvider};
///
/// let provider = HashEmbeddingProvider::new(384);
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// The model identifier this provider was created for.
    fn model_id(&self) -> &str;
}

/// Check that a backend returned one vector of the expected dimension per input.
pub(crate) fn check_batch(
    provider: &str,
    expected_len: usize,
    dimensions: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != expected_len {
        return Err(RagError::Embedding {
            provider: provider.to_string(),
            message: format!("expected {expected_len} embeddings, got {}", vectors.len()),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(RagError::Embedding {
            provider: provider.to_string(),
            message: format!("expected dimension {dimensions}, got {}", bad.len()),
        });
    }
    Ok(())
}

/// A parsed embedding model identifier.
///
/// Identifiers are scheme-qualified: `hash:<dimensions>`, `ollama:<model>`,
/// `openai:<model>` or `hf:<model>`. A bare `sentence-transformers/<model>`
/// id is an in-process model as well. Anything else is taken as an Ollama
/// model name, so tagged names such as `nomic-embed-text:latest` work unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingModel {
    /// The offline [`HashEmbeddingProvider`].
    Hash {
        /// Vector dimension.
        dimensions: usize,
    },
    /// A model served by Ollama.
    Ollama {
        /// Ollama model name.
        model: String,
    },
    /// A model served by an OpenAI-compatible API.
    OpenAi {
        /// API model name.
        model: String,
    },
    /// A sentence-transformer model run in this process.
    Local {
        /// The resolved model.
        model: LocalModel,
    },
}

impl FromStr for EmbeddingModel {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (scheme, rest) = s.split_once(':').unwrap_or(("", s));
        let named = |model: &str| {
            if model.trim().is_empty() {
                Err(RagError::Config(format!("embedding model identifier '{s}' has no model name")))
            } else {
                Ok(model.trim().to_string())
            }
        };

        match scheme {
            "hash" => {
                let dimensions = rest.trim().parse::<usize>().ok().filter(|d| *d > 0).ok_or_else(
                    || RagError::Config(format!("'{s}': hash dimension must be a positive integer")),
                )?;
                Ok(Self::Hash { dimensions })
            }
            "ollama" => Ok(Self::Ollama { model: named(rest)? }),
            "openai" => Ok(Self::OpenAi { model: named(rest)? }),
            "hf" => local(&named(rest)?),
            _ if s.starts_with("sentence-transformers/") => local(s),
            _ => Ok(Self::Ollama { model: named(s)? }),
        }
    }
}

fn local(name: &str) -> Result<EmbeddingModel> {
    let model = LocalModel::resolve(name).ok_or_else(|| {
        let known: Vec<&str> = LocalModel::known().collect();
        RagError::Config(format!(
            "unknown in-process embedding model '{name}' (supported: {})",
            known.join(", ")
        ))
    })?;
    Ok(EmbeddingModel::Local { model })
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash { dimensions } => write!(f, "hash:{dimensions}"),
            Self::Ollama { model } => write!(f, "ollama:{model}"),
            Self::OpenAi { model } => write!(f, "openai:{model}"),
            Self::Local { model } => write!(f, "hf:{model}"),
        }
    }
}

/// Where the HTTP-backed embedding providers live.
#[derive(Debug, Clone)]
pub struct EmbeddingEndpoints {
    /// Base URL of the Ollama server.
    pub ollama_url: String,
    /// Base URL of the OpenAI-compatible API.
    pub openai_url: String,
    /// API key for the OpenAI-compatible API.
    pub openai_api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Download cache for in-process models; the library default when `None`.
    pub model_cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingEndpoints {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            openai_url: OPENAI_API_BASE.to_string(),
            openai_api_key: None,
            timeout: Duration::from_secs(60),
            model_cache_dir: None,
        }
    }
}

impl EmbeddingModel {
    /// Resolve the model and construct its provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] if the model cannot be resolved, including
    /// an in-process model in a build without the `local-embeddings` feature.
    pub async fn load(&self, endpoints: &EmbeddingEndpoints) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = match self {
            Self::Hash { dimensions } => Arc::new(HashEmbeddingProvider::new(*dimensions)),
            Self::Ollama { model } => Arc::new(
                OllamaEmbeddingProvider::connect_with_timeout(
                    &endpoints.ollama_url,
                    model,
                    endpoints.timeout,
                )
                .await?,
            ),
            Self::OpenAi { model } => {
                let api_key = endpoints.openai_api_key.as_deref().unwrap_or_default();
                Arc::new(
                    OpenAIEmbeddingProvider::connect_with_timeout(
                        &endpoints.openai_url,
                        api_key,
                        model,
                        endpoints.timeout,
                    )
                    .await?,
                )
            }
            Self::Local { model } => load_local(*model, endpoints).await?,
        };
        Ok(provider)
    }
}

#[cfg(feature = "local-embeddings")]
async fn load_local(
    model: LocalModel,
    endpoints: &EmbeddingEndpoints,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider =
        crate::local::LocalEmbeddingProvider::load(model, endpoints.model_cache_dir.clone()).await?;
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "local-embeddings"))]
async fn load_local(
    model: LocalModel,
    _endpoints: &EmbeddingEndpoints,
) -> Result<Arc<dyn EmbeddingProvider>> {
    Err(RagError::ModelLoad {
        model: model.repo_id().to_string(),
        message: format!(
            "in-process models need docqa-rag built with the `{}` feature",
            crate::local::LOCAL_EMBEDDINGS_FEATURE
        ),
    })
}
