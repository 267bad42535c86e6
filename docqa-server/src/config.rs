//! Service configuration read from the environment at startup.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use docqa_rag::{
    BackendConfig, DEFAULT_GENERATION_MODEL, EmbeddingEndpoints, EmbeddingModel, Metric,
    RagConfig, RagError,
};
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default listen port.
pub const DEFAULT_PORT: u16 = 5000;
/// Default vector store directory.
pub const DEFAULT_VECTOR_DB_PATH: &str = "./vector_db";
/// Default embedding model identifier.
#[cfg(feature = "local-embeddings")]
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
/// Default embedding model identifier.
#[cfg(not(feature = "local-embeddings"))]
pub const DEFAULT_EMBEDDING_MODEL: &str = "ollama:all-minilm";
/// Default generation backend.
pub const DEFAULT_LLM_BACKEND: &str = "ollama";
/// Default timeout for backend requests, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors raised while reading the service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be used.
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        /// The environment variable.
        key: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The values parsed but do not form a valid pipeline configuration.
    #[error(transparent)]
    Rag(#[from] RagError),
}

/// Log output format, selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human readable output.
    Pretty,
    /// Single-line human readable output.
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty, compact or json)")),
        }
    }
}

/// Everything the service needs to start.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Listen address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Directory holding the persisted collections.
    pub vector_db_path: PathBuf,
    /// Embedding model to load.
    pub embedding_model: EmbeddingModel,
    /// Where HTTP embedding providers are reached.
    pub embedding_endpoints: EmbeddingEndpoints,
    /// Generation backend.
    pub backend: BackendConfig,
    /// Timeout applied to every backend request.
    pub timeout: Duration,
    /// Pipeline tuning.
    pub rag: RagConfig,
    /// Log output format.
    pub log_format: LogFormat,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vector_db_path", &self.vector_db_path)
            .field("embedding_model", &self.embedding_model)
            .field("backend", &self.backend)
            .field("timeout", &self.timeout)
            .field("rag", &self.rag)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ServiceConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;
        let vector_db_path =
            PathBuf::from(get("VECTOR_DB_PATH").unwrap_or_else(|| DEFAULT_VECTOR_DB_PATH.to_string()));

        let model_id = get("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
        let embedding_model = model_id.parse::<EmbeddingModel>().map_err(|e| ConfigError::Invalid {
            key: "EMBEDDING_MODEL",
            value: model_id.clone(),
            reason: e.to_string(),
        })?;

        let timeout_secs = parse_or("LLM_TIMEOUT_SECS", get("LLM_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "LLM_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "timeout must be at least one second".to_string(),
            });
        }
        let timeout = Duration::from_secs(timeout_secs);

        let api_key = get("LLM_API_KEY");
        let mut embedding_endpoints =
            EmbeddingEndpoints { openai_api_key: api_key.clone(), timeout, ..Default::default() };
        if let Some(url) = get("EMBEDDING_BASE_URL") {
            embedding_endpoints.ollama_url = url.clone();
            embedding_endpoints.openai_url = url;
        }
        embedding_endpoints.model_cache_dir = get("EMBEDDING_CACHE_DIR").map(PathBuf::from);

        let backend_kind = get("LLM_BACKEND").unwrap_or_else(|| DEFAULT_LLM_BACKEND.to_string());
        let model = get("LLM_MODEL").unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string());
        let base_url = get("LLM_BASE_URL");
        let backend =
            BackendConfig::parse(&backend_kind, &model, base_url.as_deref(), api_key.as_deref())?;

        let defaults = RagConfig::default();
        let rag = RagConfig::builder()
            .chunk_size(parse_or("CHUNK_SIZE", get("CHUNK_SIZE"), defaults.chunk_size)?)
            .chunk_overlap(parse_or("CHUNK_OVERLAP", get("CHUNK_OVERLAP"), defaults.chunk_overlap)?)
            .metric(parse_or::<Metric>("DISTANCE_METRIC", get("DISTANCE_METRIC"), defaults.metric)?)
            .build()?;

        let log_format = match get("LOG_FORMAT") {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                key: "LOG_FORMAT",
                value,
                reason,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            host,
            port,
            vector_db_path,
            embedding_model,
            embedding_endpoints,
            backend,
            timeout,
            rag,
            log_format,
        })
    }
}

fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use docqa_rag::DEFAULT_OLLAMA_URL;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.vector_db_path, PathBuf::from("./vector_db"));
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL.parse().unwrap());
        assert_eq!(config.embedding_endpoints.model_cache_dir, None);
        assert_eq!(
            config.backend,
            BackendConfig::Ollama { base_url: DEFAULT_OLLAMA_URL.into(), model: "llama2".into() }
        );
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.rag, RagConfig::default());
        assert_eq!(config.log_format, LogFormat::Compact);
    }

    #[test]
    fn variables_override_defaults() {
        let config = config(&[
            ("PORT", "8080"),
            ("VECTOR_DB_PATH", "/var/lib/docqa"),
            ("EMBEDDING_MODEL", "hash:128"),
            ("LLM_BACKEND", "openai"),
            ("LLM_MODEL", "gpt-4o-mini"),
            ("LLM_API_KEY", "sk-test"),
            ("LLM_TIMEOUT_SECS", "5"),
            ("CHUNK_SIZE", "256"),
            ("CHUNK_OVERLAP", "16"),
            ("LOG_FORMAT", "json"),
            ("DISTANCE_METRIC", "euclidean"),
            ("EMBEDDING_CACHE_DIR", "/var/cache/docqa"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.vector_db_path, PathBuf::from("/var/lib/docqa"));
        assert_eq!(config.embedding_model, EmbeddingModel::Hash { dimensions: 128 });
        assert!(matches!(config.backend, BackendConfig::OpenAi { ref model, .. } if model == "gpt-4o-mini"));
        assert_eq!(config.embedding_endpoints.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!((config.rag.chunk_size, config.rag.chunk_overlap), (256, 16));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.rag.metric, Metric::Euclidean);
        assert_eq!(
            config.embedding_endpoints.model_cache_dir,
            Some(PathBuf::from("/var/cache/docqa"))
        );
    }

    #[test]
    fn sentence_transformer_ids_select_in_process_models() {
        let config = config(&[("EMBEDDING_MODEL", "sentence-transformers/all-MiniLM-L6-v2")]).unwrap();
        assert!(matches!(config.embedding_model, EmbeddingModel::Local { .. }));
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn default_embedding_model_is_served_by_ollama() {
        let config = config(&[]).unwrap();
        assert_eq!(config.embedding_model, EmbeddingModel::Ollama { model: "all-minilm".into() });
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config(&[("PORT", "  "), ("LLM_BACKEND", "")]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(matches!(config.backend, BackendConfig::Ollama { .. }));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(config(&[("PORT", "http")]), Err(ConfigError::Invalid { key: "PORT", .. })));
        assert!(matches!(
            config(&[("EMBEDDING_MODEL", "hash:0")]),
            Err(ConfigError::Invalid { key: "EMBEDDING_MODEL", .. })
        ));
        assert!(matches!(
            config(&[("LLM_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Invalid { key: "LLM_TIMEOUT_SECS", .. })
        ));
        assert!(matches!(
            config(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::Invalid { key: "LOG_FORMAT", .. })
        ));
        assert!(matches!(
            config(&[("DISTANCE_METRIC", "manhattan")]),
            Err(ConfigError::Invalid { key: "DISTANCE_METRIC", .. })
        ));
    }

    #[test]
    fn unsupported_backend_is_a_configuration_error() {
        let err = config(&[("LLM_BACKEND", "huggingface")]).unwrap_err();
        assert!(matches!(err, ConfigError::Rag(RagError::Config(_))));
        assert!(err.to_string().contains("huggingface"));

        let err = config(&[("LLM_BACKEND", "openai")]).unwrap_err();
        assert!(matches!(err, ConfigError::Rag(RagError::Config(_))));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = config(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "100")]).unwrap_err();
        assert!(matches!(err, ConfigError::Rag(RagError::Config(_))));
    }
}
