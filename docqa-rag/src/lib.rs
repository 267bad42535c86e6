//! Retrieval-augmented generation over local documents.
//!
//! This crate provides:
//! - Document loading for PDF and text files
//! - Recursive, overlap-preserving chunking
//! - Embedding providers (offline feature hashing, in-process sentence transformers,
//!   Ollama, OpenAI-compatible)
//! - Named vector collections, in memory or persisted to disk
//! - Answer generation through Ollama or an OpenAI-compatible API
//! - [`RagPipeline`], which ties the pieces together for indexing and querying

pub mod chunking;
pub mod collection;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filestore;
pub mod generator;
pub mod hashing;
pub mod inmemory;
pub mod loader;
pub mod local;
pub mod ollama;
pub mod openai;
pub mod pipeline;
pub mod similarity;
pub mod vectorstore;

pub use chunking::{Chunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, Metadata, MetadataValue, SearchResult};
pub use embedding::{EmbeddingEndpoints, EmbeddingModel, EmbeddingProvider};
pub use error::{ErrorKind, PipelineStage, RagError, Result};
pub use filestore::FileVectorStore;
pub use generator::{
    BackendConfig, DEFAULT_GENERATION_MODEL, GENERATION_ERROR_RESPONSE, GenerationBackend,
    GenerationOptions, Generator, build_prompt,
};
pub use hashing::HashEmbeddingProvider;
pub use inmemory::InMemoryVectorStore;
pub use loader::load_path;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbeddingProvider;
pub use local::LocalModel;
pub use ollama::{DEFAULT_OLLAMA_URL, OllamaEmbeddingProvider};
pub use openai::{OPENAI_API_BASE, OpenAIEmbeddingProvider};
pub use pipeline::{CONTEXT_SEPARATOR, IndexReport, QueryResult, RagPipeline, RagPipelineBuilder};
pub use similarity::{Metric, cosine_similarity};
pub use vectorstore::{CollectionHandle, VectorStore};
