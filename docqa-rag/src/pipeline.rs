//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the index workflow (load → chunk → embed →
//! insert) and the query workflow (embed → search → generate) by composing a
//! [`Chunker`], an [`EmbeddingProvider`], a [`VectorStore`] and a
//! [`Generator`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{FileVectorStore, Generator, HashEmbeddingProvider, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::new(384)))
//!     .vector_store(Arc::new(FileVectorStore::open("./vector_db").await?))
//!     .generator(generator)
//!     .build()?;
//!
//! pipeline.index_path("./docs", "documents").await?;
//! let result = pipeline.query("What is RAG?", "documents", 5).await?;
//! println!("{}", result.response);
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Document, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{PipelineStage, RagError, Result};
use crate::generator::Generator;
use crate::loader::load_path;
use crate::vectorstore::VectorStore;

/// Separator placed between retrieved chunk texts in the context blob.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Outcome of an index operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Documents that were chunked.
    pub documents: usize,
    /// Chunks embedded and inserted.
    pub chunks: usize,
    /// Record ids written, in chunk order.
    pub ids: Vec<String>,
}

/// The answer to a query together with the sources it was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// The query text.
    pub query: String,
    /// The generated answer, or the generation error sentinel.
    pub response: String,
    /// Retrieved chunk texts in rank order.
    pub source_documents: Vec<String>,
    /// Number of retrieved chunks.
    pub num_sources: usize,
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. All components are shared,
/// so a pipeline can serve concurrent requests behind an `Arc`.
pub struct RagPipeline {
    config: RagConfig,
    chunker: Arc<dyn Chunker>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    generator: Generator,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Load every document at `path` and index it into `collection`.
    ///
    /// # Errors
    ///
    /// Fails with a [`RagError::Stage`] naming the stage that failed; a
    /// missing path fails the `load` stage with [`RagError::PathNotFound`].
    pub async fn index_path(&self, path: impl AsRef<Path>, collection: &str) -> Result<IndexReport> {
        let path = path.as_ref();
        let documents = load_path(path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to load documents");
            e.in_stage(PipelineStage::Load)
        })?;
        if documents.is_empty() {
            warn!(path = %path.display(), "no documents found");
        }
        self.index_documents(&documents, collection).await
    }

    /// Chunk, embed and insert `documents` into `collection`.
    ///
    /// All chunks are inserted with a single write, so a failure leaves the
    /// collection as it was.
    ///
    /// # Errors
    ///
    /// Fails with a [`RagError::Stage`] naming the stage that failed.
    pub async fn index_documents(
        &self,
        documents: &[Document],
        collection: &str,
    ) -> Result<IndexReport> {
        let handle = self
            .vector_store
            .ensure_collection_with_metric(collection, self.config.metric)
            .await
            .map_err(|e| e.in_stage(PipelineStage::Insert))?;

        let chunks = self.chunker.chunk_all(documents);
        info!(
            collection,
            document_count = documents.len(),
            chunk_count = chunks.len(),
            "chunked documents"
        );
        if chunks.is_empty() {
            return Ok(IndexReport { documents: documents.len(), chunks: 0, ids: Vec::new() });
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let vectors = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
                error!(collection, error = %e, "embedding failed during indexing");
                e.in_stage(PipelineStage::Embed)
            })?;
            embeddings.extend(vectors);
        }

        let ids = self.vector_store.add(&handle, &chunks, &embeddings, None).await.map_err(|e| {
            error!(collection, error = %e, "insert failed during indexing");
            e.in_stage(PipelineStage::Insert)
        })?;

        info!(collection, chunk_count = chunks.len(), "indexed documents");
        Ok(IndexReport { documents: documents.len(), chunks: chunks.len(), ids })
    }

    /// Return the `n` chunks of `collection` most similar to `query`.
    ///
    /// A collection that was never indexed is created empty and yields no results.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] for an empty query or `n == 0`,
    /// otherwise a [`RagError::Stage`] naming the stage that failed.
    pub async fn retrieve(
        &self,
        query: &str,
        collection: &str,
        n: usize,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".to_string()));
        }
        if n == 0 {
            return Err(RagError::InvalidInput("n_results must be at least 1".to_string()));
        }

        let handle = self
            .vector_store
            .ensure_collection(collection)
            .await
            .map_err(|e| e.in_stage(PipelineStage::Search))?;

        let embedding = self.embedding_provider.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e.in_stage(PipelineStage::Embed)
        })?;

        let results = self.vector_store.search(&handle, &embedding, n).await.map_err(|e| {
            error!(collection, error = %e, "vector store search failed");
            e.in_stage(PipelineStage::Search)
        })?;

        info!(collection, result_count = results.len(), "retrieved chunks");
        Ok(results)
    }

    /// Retrieve the `n` best chunks and generate an answer from them.
    ///
    /// Generation failures do not fail the query: the response is replaced by
    /// [`GENERATION_ERROR_RESPONSE`](crate::GENERATION_ERROR_RESPONSE) and the
    /// sources are still returned. An empty collection produces an empty
    /// context and the generator is still called.
    ///
    /// # Errors
    ///
    /// Same as [`retrieve`](Self::retrieve).
    pub async fn query(&self, query: &str, collection: &str, n: usize) -> Result<QueryResult> {
        let results = self.retrieve(query, collection, n).await?;
        let source_documents: Vec<String> = results.into_iter().map(|r| r.text).collect();
        let context = source_documents.join(CONTEXT_SEPARATOR);

        let response = self
            .generator
            .generate(query, &context, self.config.temperature, self.config.max_tokens)
            .await;

        Ok(QueryResult {
            query: query.to_string(),
            response,
            num_sources: source_documents.len(),
            source_documents,
        })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider`, `vector_store` and `generator` are required.
/// `config` defaults to [`RagConfig::default()`] and `chunker` to a
/// [`RecursiveChunker`] built from the config.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .generator(generator)
///     .chunker(Arc::new(RecursiveChunker::new(256, 32)))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    generator: Option<Generator>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Generator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any required field is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::Config("vector_store is required".to_string()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::Config("generator is required".to_string()))?;
        let chunker = self
            .chunker
            .unwrap_or_else(|| Arc::new(RecursiveChunker::from_config(&config)));

        Ok(RagPipeline { config, chunker, embedding_provider, vector_store, generator })
    }
}
