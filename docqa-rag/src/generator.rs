//! Answer generation from a question and a retrieved context.
//!
//! A [`Generator`] owns one [`GenerationBackend`], chosen once from a
//! [`BackendConfig`]. Backend failures never escape [`Generator::generate`]:
//! they are logged and replaced by [`GENERATION_ERROR_RESPONSE`] so a query
//! still returns its sources when the language model is down.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{PipelineStage, RagError, Result};
use crate::ollama::DEFAULT_OLLAMA_URL;
use crate::openai::OPENAI_API_BASE;

/// Text returned in place of an answer when the backend fails.
pub const GENERATION_ERROR_RESPONSE: &str = "Error generating response";

/// Default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "llama2";

/// Sampling options passed to a backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// A text-generation service that completes a single prompt.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Complete `prompt` and return the generated text.
    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}

/// The supported generation backends.
#[derive(Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// A local Ollama server.
    Ollama {
        /// Server base URL.
        base_url: String,
        /// Model name.
        model: String,
    },
    /// An OpenAI-compatible chat completions API.
    OpenAi {
        /// API base URL.
        base_url: String,
        /// Bearer token.
        api_key: String,
        /// Model name.
        model: String,
    },
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama { base_url, model } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            Self::OpenAi { base_url, model, .. } => f
                .debug_struct("OpenAi")
                .field("base_url", base_url)
                .field("api_key", &"<redacted>")
                .field("model", model)
                .finish(),
        }
    }
}

impl BackendConfig {
    /// Build a backend configuration from a backend kind (`ollama` or `openai`).
    ///
    /// `base_url` falls back to the backend's default address. The OpenAI
    /// backend requires a non-empty `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] for unknown kinds, an empty model name or
    /// a missing API key.
    pub fn parse(
        kind: &str,
        model: &str,
        base_url: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Self> {
        let model = model.trim();
        if model.is_empty() {
            return Err(RagError::Config("generation model name is empty".to_string()));
        }

        match kind.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama {
                base_url: base_url.unwrap_or(DEFAULT_OLLAMA_URL).to_string(),
                model: model.to_string(),
            }),
            "openai" => {
                let api_key = api_key.map(str::trim).filter(|k| !k.is_empty()).ok_or_else(|| {
                    RagError::Config("the openai backend requires an API key".to_string())
                })?;
                Ok(Self::OpenAi {
                    base_url: base_url.unwrap_or(OPENAI_API_BASE).to_string(),
                    api_key: api_key.to_string(),
                    model: model.to_string(),
                })
            }
            other => Err(RagError::Config(format!("unsupported generation backend '{other}'"))),
        }
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        match self {
            Self::Ollama { model, .. } | Self::OpenAi { model, .. } => model,
        }
    }
}

/// Build the model-facing prompt: context first, then the question.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {question}\n\nAnswer:")
}

/// Produces answers through a configured [`GenerationBackend`].
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{BackendConfig, Generator};
///
/// let config = BackendConfig::parse("ollama", "llama2", None, None)?;
/// let generator = Generator::from_config(&config, Duration::from_secs(60))?;
/// let answer = generator.generate("What is RAG?", &context, 0.3, 500).await;
/// ```
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn GenerationBackend>,
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator").field("backend", &self.backend.name()).finish()
    }
}

impl Generator {
    /// Construct the backend described by `config`; every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the HTTP client cannot be built.
    pub fn from_config(config: &BackendConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;

        let backend: Arc<dyn GenerationBackend> = match config {
            BackendConfig::Ollama { base_url, model } => {
                Arc::new(OllamaBackend::new(client, base_url, model))
            }
            BackendConfig::OpenAi { base_url, api_key, model } => {
                Arc::new(OpenAiBackend::new(client, base_url, api_key, model))
            }
        };
        info!(backend = backend.name(), model = config.model(), ?timeout, "configured generator");
        Ok(Self { backend })
    }

    /// Use an already constructed backend.
    pub fn with_backend(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Generate an answer, surfacing backend failures.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::BackendUnavailable`] if the backend call fails.
    pub async fn try_generate(
        &self,
        question: &str,
        context: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let prompt = build_prompt(question, context);
        let options = GenerationOptions { temperature, max_tokens };
        debug!(backend = self.backend.name(), prompt_chars = prompt.chars().count(), "generating");

        self.backend.complete(&prompt, &options).await.map_err(|e| match e {
            e @ RagError::BackendUnavailable { .. } => e,
            other => RagError::BackendUnavailable {
                backend: self.backend.name().to_string(),
                message: other.to_string(),
            },
        })
    }

    /// Generate an answer, degrading to [`GENERATION_ERROR_RESPONSE`] on failure.
    pub async fn generate(
        &self,
        question: &str,
        context: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> String {
        match self.try_generate(question, context, temperature, max_tokens).await {
            Ok(answer) => answer,
            Err(e) => {
                let e = e.in_stage(PipelineStage::Generate);
                error!(backend = self.backend.name(), error = %e, "generation failed");
                GENERATION_ERROR_RESPONSE.to_string()
            }
        }
    }
}

fn unavailable(backend: &str, message: impl fmt::Display) -> RagError {
    RagError::BackendUnavailable { backend: backend.to_string(), message: message.to_string() }
}

async fn read_json<T: DeserializeOwned>(
    backend: &str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(unavailable(backend, format!("API returned {status}: {body}")));
    }
    response.json().await.map_err(|e| unavailable(backend, format!("failed to parse response: {e}")))
}

/// Ollama `/api/generate` backend.
struct OllamaBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaBackend {
    fn new(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable(self.name(), format!("request failed: {e}")))?;

        let parsed: OllamaGenerateResponse = read_json(self.name(), response).await?;
        Ok(parsed.response)
    }
}

/// OpenAI-compatible `/chat/completions` backend.
struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiBackend {
    fn new(client: reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable(self.name(), format!("request failed: {e}")))?;

        let parsed: ChatResponse = read_json(self.name(), response).await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| unavailable(self.name(), "response contained no choices"))
    }
}
