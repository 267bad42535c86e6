//! In-process sentence-transformer embedding models.
//!
//! [`LocalModel`] names the supported models and is always available so that
//! identifiers parse the same way regardless of build features. The
//! [`LocalEmbeddingProvider`] that runs them needs the `local-embeddings`
//! feature, which pulls in `fastembed` (ONNX runtime + Hugging Face hub
//! downloads).

use std::fmt;

/// Cargo feature that enables [`LocalEmbeddingProvider`].
pub const LOCAL_EMBEDDINGS_FEATURE: &str = "local-embeddings";

/// Sentence-transformer models that can run in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalModel {
    /// `sentence-transformers/all-MiniLM-L6-v2`, 384 dimensions.
    AllMiniLmL6V2,
    /// `sentence-transformers/all-MiniLM-L12-v2`, 384 dimensions.
    AllMiniLmL12V2,
    /// `sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2`, 384 dimensions.
    ParaphraseMultilingualMiniLmL12V2,
    /// `BAAI/bge-small-en-v1.5`, 384 dimensions.
    BgeSmallEnV15,
    /// `BAAI/bge-base-en-v1.5`, 768 dimensions.
    BgeBaseEnV15,
}

const KNOWN_MODELS: &[LocalModel] = &[
    LocalModel::AllMiniLmL6V2,
    LocalModel::AllMiniLmL12V2,
    LocalModel::ParaphraseMultilingualMiniLmL12V2,
    LocalModel::BgeSmallEnV15,
    LocalModel::BgeBaseEnV15,
];

impl LocalModel {
    /// Resolve a Hugging Face repository id, with or without its owner prefix.
    ///
    /// Matching ignores ASCII case, so `all-minilm-l6-v2` resolves too.
    pub fn resolve(name: &str) -> Option<Self> {
        let name = name.trim();
        KNOWN_MODELS.iter().copied().find(|model| {
            let repo = model.repo_id();
            let short = repo.rsplit('/').next().unwrap_or(repo);
            repo.eq_ignore_ascii_case(name) || short.eq_ignore_ascii_case(name)
        })
    }

    /// The Hugging Face repository id.
    pub fn repo_id(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::AllMiniLmL12V2 => "sentence-transformers/all-MiniLM-L12-v2",
            Self::ParaphraseMultilingualMiniLmL12V2 => {
                "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2"
            }
            Self::BgeSmallEnV15 => "BAAI/bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "BAAI/bge-base-en-v1.5",
        }
    }

    /// Native output dimension.
    pub fn dimensions(self) -> usize {
        match self {
            Self::BgeBaseEnV15 => 768,
            _ => 384,
        }
    }

    /// Repository ids of every supported model.
    pub fn known() -> impl Iterator<Item = &'static str> {
        KNOWN_MODELS.iter().map(|model| model.repo_id())
    }
}

impl fmt::Display for LocalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.repo_id())
    }
}

#[cfg(feature = "local-embeddings")]
pub use provider::LocalEmbeddingProvider;

#[cfg(feature = "local-embeddings")]
mod provider {
    use std::fmt;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use fastembed::{InitOptions, TextEmbedding};
    use tracing::{debug, info};

    use super::LocalModel;
    use crate::embedding::{EmbeddingProvider, check_batch};
    use crate::error::{RagError, Result};

    const PROVIDER: &str = "local";

    impl LocalModel {
        fn fastembed(self) -> fastembed::EmbeddingModel {
            match self {
                Self::AllMiniLmL6V2 => fastembed::EmbeddingModel::AllMiniLML6V2,
                Self::AllMiniLmL12V2 => fastembed::EmbeddingModel::AllMiniLML12V2,
                Self::ParaphraseMultilingualMiniLmL12V2 => {
                    fastembed::EmbeddingModel::ParaphraseMLMiniLML12V2
                }
                Self::BgeSmallEnV15 => fastembed::EmbeddingModel::BGESmallENV15,
                Self::BgeBaseEnV15 => fastembed::EmbeddingModel::BGEBaseENV15,
            }
        }
    }

    /// An [`EmbeddingProvider`] that runs a sentence-transformer model in this process.
    ///
    /// Model files are downloaded from the Hugging Face hub on first use and
    /// cached. Inference runs on the blocking thread pool.
    pub struct LocalEmbeddingProvider {
        model: Arc<Mutex<TextEmbedding>>,
        local_model: LocalModel,
    }

    impl fmt::Debug for LocalEmbeddingProvider {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("LocalEmbeddingProvider").field("model", &self.local_model).finish()
        }
    }

    impl LocalEmbeddingProvider {
        /// Download (if needed) and initialise `model`.
        ///
        /// # Errors
        ///
        /// Returns [`RagError::ModelLoad`] if the model cannot be fetched or
        /// initialised, or produces vectors of an unexpected dimension.
        pub async fn load(model: LocalModel, cache_dir: Option<PathBuf>) -> Result<Self> {
            let model_load = |message: String| RagError::ModelLoad {
                model: model.repo_id().to_string(),
                message,
            };

            info!(model = %model, "loading in-process embedding model");
            let embedding = tokio::task::spawn_blocking(move || {
                let mut options =
                    InitOptions::new(model.fastembed()).with_show_download_progress(false);
                if let Some(dir) = cache_dir {
                    options = options.with_cache_dir(dir);
                }
                TextEmbedding::try_new(options).map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| model_load(format!("model load task failed: {e}")))?
            .map_err(model_load)?;

            let provider = Self { model: Arc::new(Mutex::new(embedding)), local_model: model };
            let probe = provider
                .run(vec!["dimension probe".to_string()])
                .await
                .map_err(|e| model_load(e.to_string()))?;
            let dimensions = probe.first().map(Vec::len).unwrap_or_default();
            if dimensions != model.dimensions() {
                return Err(model_load(format!(
                    "expected {} dimensions, model produced {dimensions}",
                    model.dimensions()
                )));
            }

            info!(model = %model, dimensions, "in-process embedding model ready");
            Ok(provider)
        }

        async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let model = Arc::clone(&self.model);
            let embedding_error =
                |message: String| RagError::Embedding { provider: PROVIDER.to_string(), message };

            tokio::task::spawn_blocking(move || {
                let mut model =
                    model.lock().map_err(|_| "embedding model lock poisoned".to_string())?;
                model.embed(texts, None).map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| embedding_error(format!("embedding task failed: {e}")))?
            .map_err(embedding_error)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LocalEmbeddingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut vectors = self.embed_batch(&[text]).await?;
            vectors.pop().ok_or_else(|| RagError::Embedding {
                provider: PROVIDER.to_string(),
                message: "empty embedding result".to_string(),
            })
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            debug!(model = %self.local_model, count = texts.len(), "embedding batch in-process");
            let vectors = self.run(texts.iter().map(|t| t.to_string()).collect()).await?;
            check_batch(PROVIDER, texts.len(), self.dimensions(), &vectors)?;
            Ok(vectors)
        }

        fn dimensions(&self) -> usize {
            self.local_model.dimensions()
        }

        fn model_id(&self) -> &str {
            self.local_model.repo_id()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "local-embeddings")]
    use crate::embedding::EmbeddingProvider;

    #[test]
    fn resolves_full_and_short_names() {
        assert_eq!(
            LocalModel::resolve("sentence-transformers/all-MiniLM-L6-v2"),
            Some(LocalModel::AllMiniLmL6V2)
        );
        assert_eq!(LocalModel::resolve("all-minilm-l6-v2"), Some(LocalModel::AllMiniLmL6V2));
        assert_eq!(LocalModel::resolve("BAAI/bge-base-en-v1.5"), Some(LocalModel::BgeBaseEnV15));
        assert_eq!(LocalModel::resolve("sentence-transformers/unknown-model"), None);
    }

    #[test]
    fn dimensions_follow_the_model() {
        assert_eq!(LocalModel::AllMiniLmL6V2.dimensions(), 384);
        assert_eq!(LocalModel::BgeBaseEnV15.dimensions(), 768);
        assert!(LocalModel::known().any(|id| id == "sentence-transformers/all-MiniLM-L12-v2"));
    }

    #[cfg(feature = "local-embeddings")]
    #[tokio::test]
    #[ignore] // Requires model download
    async fn minilm_embeds_in_process() {
        let cache = tempfile::tempdir().unwrap();
        let provider = LocalEmbeddingProvider::load(
            LocalModel::AllMiniLmL6V2,
            Some(cache.path().to_path_buf()),
        )
        .await
        .unwrap();
        let vectors = provider.embed_batch(&["Hello world", "This is a test"]).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 384);
    }
}
