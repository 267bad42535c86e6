//! Error types for the `docqa-rag` crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::similarity::Metric;

/// A stage of the index or query pipeline, reported when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Loading documents from the filesystem.
    Load,
    /// Computing embeddings for chunks or the query.
    Embed,
    /// Writing records into the vector store.
    Insert,
    /// Ensuring the collection and searching it.
    Search,
    /// Producing the answer from the generation backend.
    Generate,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Embed => "embed",
            Self::Insert => "insert",
            Self::Search => "search",
            Self::Generate => "generate",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`RagError`], used by callers that need to
/// map failures onto a status (for example an HTTP code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal startup misconfiguration.
    Configuration,
    /// The caller's request was malformed.
    InvalidInput,
    /// The caller referenced something that does not exist.
    NotFound,
    /// An internal data invariant would have been violated.
    Invariant,
    /// An external backend (embedding model, storage) failed.
    Backend,
}

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configured embedding model could not be resolved at startup.
    #[error("Failed to load embedding model '{model}': {message}")]
    ModelLoad {
        /// The model identifier that failed to resolve.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// A request argument was missing or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A document path does not exist.
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// A collection name is not usable as a collection identifier.
    #[error("Invalid collection name '{0}'")]
    InvalidCollectionName(String),

    /// An embedding's dimension differs from the collection's established dimension.
    #[error(
        "Dimension mismatch in collection '{collection}': expected {expected}, got {actual}"
    )]
    DimensionMismatch {
        /// The collection being written.
        collection: String,
        /// The dimension established by the first insert.
        expected: usize,
        /// The dimension of the offending embedding.
        actual: usize,
    },

    /// A handle was used that was never issued by `ensure_collection` on this store.
    #[error("Collection '{0}' is not initialized; call ensure_collection first")]
    CollectionNotInitialized(String),

    /// Chunks, embeddings and ids passed to `add` have different lengths.
    #[error("Length mismatch: {chunks} chunks, {embeddings} embeddings")]
    LengthMismatch {
        /// Number of chunks supplied.
        chunks: usize,
        /// Number of embeddings (or ids) supplied.
        embeddings: usize,
    },

    /// A record id is already present in the collection or repeated in the batch.
    #[error("Duplicate record id '{id}' in collection '{collection}'")]
    DuplicateId {
        /// The collection being written.
        collection: String,
        /// The repeated id.
        id: String,
    },

    /// A populated collection was requested with a different similarity metric.
    #[error(
        "Collection '{collection}' already holds data indexed with {existing}; cannot switch to {requested}"
    )]
    MetricMismatch {
        /// The collection.
        collection: String,
        /// The metric the data was indexed with.
        existing: Metric,
        /// The metric that was requested.
        requested: Metric,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    Storage {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation backend could not produce an answer.
    #[error("Generation backend '{backend}' unavailable: {message}")]
    BackendUnavailable {
        /// The generation backend.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A pipeline stage failed.
    #[error("{stage} stage failed: {source}")]
    Stage {
        /// The stage that failed.
        stage: PipelineStage,
        /// The underlying failure.
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    /// Wrap this error as the failure of a pipeline stage.
    pub fn in_stage(self, stage: PipelineStage) -> Self {
        Self::Stage { stage, source: Box::new(self) }
    }

    /// The stage that failed, if this error came out of the pipeline.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, looking through stage wrappers.
    pub fn root(&self) -> &RagError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Stage { source, .. } => source.kind(),
            Self::Config(_) | Self::ModelLoad { .. } => ErrorKind::Configuration,
            Self::InvalidInput(_) | Self::InvalidCollectionName(_) => ErrorKind::InvalidInput,
            Self::PathNotFound(_) => ErrorKind::NotFound,
            Self::DimensionMismatch { .. }
            | Self::CollectionNotInitialized(_)
            | Self::LengthMismatch { .. }
            | Self::DuplicateId { .. }
            | Self::MetricMismatch { .. } => ErrorKind::Invariant,
            Self::Embedding { .. } | Self::Storage { .. } | Self::BackendUnavailable { .. } => {
                ErrorKind::Backend
            }
        }
    }

    pub(crate) fn storage(backend: &str, message: impl fmt::Display) -> Self {
        Self::Storage { backend: backend.to_string(), message: message.to_string() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
