//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;
use uuid::Uuid;

use crate::document::{Chunk, SearchResult};
use crate::error::Result;
use crate::similarity::Metric;

/// A reference to a collection, issued by [`VectorStore::ensure_collection`].
///
/// Handles remember which store issued them; passing a handle to any other
/// store fails with [`RagError::CollectionNotInitialized`](crate::RagError::CollectionNotInitialized).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionHandle {
    store_id: Uuid,
    name: String,
}

impl CollectionHandle {
    /// Create a handle for collection `name` on the store identified by `store_id`.
    ///
    /// Stores validate handles on use, so constructing one by hand does not
    /// create the collection.
    pub fn new(store_id: Uuid, name: impl Into<String>) -> Self {
        Self { store_id, name: name.into() }
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The id of the store that issued this handle.
    pub fn store_id(&self) -> Uuid {
        self.store_id
    }
}

/// A storage backend for vector embeddings with similarity search.
///
/// Implementations manage named collections of (id, embedding, text,
/// metadata) records. Collections are created lazily on first reference and
/// never deleted implicitly. Writes to one collection are serialised and
/// searches observe a collection either before or after a write.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// let docs = store.ensure_collection("docs").await?;
/// store.add(&docs, &chunks, &embeddings, None).await?;
/// let results = store.search(&docs, &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Get or create a named collection.
    ///
    /// New collections use cosine similarity. Existing collections are
    /// returned with whatever metric they were created with.
    async fn ensure_collection(&self, name: &str) -> Result<CollectionHandle>;

    /// Get or create a named collection that is searched with `metric`.
    ///
    /// Fails with [`RagError::MetricMismatch`](crate::RagError::MetricMismatch)
    /// if the collection already holds records indexed under another metric.
    async fn ensure_collection_with_metric(
        &self,
        name: &str,
        metric: Metric,
    ) -> Result<CollectionHandle>;

    /// Append records. `chunks` and `embeddings` are parallel slices; `ids`,
    /// when given, must be parallel too and new to the collection.
    ///
    /// The write is durable (for persistent stores) before this returns.
    /// On error the collection is unchanged. Returns the ids written.
    async fn add(
        &self,
        handle: &CollectionHandle,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
        ids: Option<&[String]>,
    ) -> Result<Vec<String>>;

    /// Search for the `top_k` most similar records to the given embedding.
    ///
    /// Returns results ordered by descending similarity score; fewer than
    /// `top_k` if the collection is smaller, none if it is empty.
    async fn search(
        &self,
        handle: &CollectionHandle,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Number of records in a collection.
    async fn count(&self, handle: &CollectionHandle) -> Result<usize>;

    /// Names of all known collections, sorted.
    async fn list_collections(&self) -> Result<Vec<String>>;
}
