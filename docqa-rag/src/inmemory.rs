//! In-memory vector store.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` of collections protected by `tokio::sync` locks. Nothing is
//! persisted; it is suitable for tests and short-lived processes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::collection::{CollectionSlot, CollectionState, validate_collection_name};
use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::similarity::Metric;
use crate::vectorstore::{CollectionHandle, VectorStore};

/// An in-memory vector store.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// let docs = store.ensure_collection("docs").await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    id: Uuid,
    collections: RwLock<HashMap<String, Arc<CollectionSlot>>>,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self { id: Uuid::new_v4(), collections: RwLock::new(HashMap::new()) }
    }
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn open(&self, name: &str, metric: Option<Metric>) -> Result<CollectionHandle> {
        validate_collection_name(name)?;

        let slot = {
            let mut collections = self.collections.write().await;
            collections
                .entry(name.to_string())
                .or_insert_with(|| {
                    debug!(collection = name, "created in-memory collection");
                    Arc::new(CollectionSlot::new(CollectionState::new(
                        name,
                        metric.unwrap_or_default(),
                    )))
                })
                .clone()
        };

        if let Some(metric) = metric {
            let _writer = slot.writer.lock().await;
            let mut state = slot.state.write().await;
            if state.check_metric(metric)? {
                state.metric = metric;
            }
        }

        Ok(CollectionHandle::new(self.id, name))
    }

    async fn slot(&self, handle: &CollectionHandle) -> Result<Arc<CollectionSlot>> {
        if handle.store_id() != self.id {
            return Err(RagError::CollectionNotInitialized(handle.name().to_string()));
        }
        self.collections
            .read()
            .await
            .get(handle.name())
            .cloned()
            .ok_or_else(|| RagError::CollectionNotInitialized(handle.name().to_string()))
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str) -> Result<CollectionHandle> {
        self.open(name, None).await
    }

    async fn ensure_collection_with_metric(
        &self,
        name: &str,
        metric: Metric,
    ) -> Result<CollectionHandle> {
        self.open(name, Some(metric)).await
    }

    async fn add(
        &self,
        handle: &CollectionHandle,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
        ids: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let slot = self.slot(handle).await?;
        let _writer = slot.writer.lock().await;

        let records = slot.state.read().await.prepare(chunks, embeddings, ids)?;
        let written: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        slot.state.write().await.commit(records);

        debug!(collection = handle.name(), count = written.len(), "added records");
        Ok(written)
    }

    async fn search(
        &self,
        handle: &CollectionHandle,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let slot = self.slot(handle).await?;
        let state = slot.state.read().await;
        state.search(embedding, top_k)
    }

    async fn count(&self, handle: &CollectionHandle) -> Result<usize> {
        let slot = self.slot(handle).await?;
        let count = slot.state.read().await.len();
        Ok(count)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            content: text.to_string(),
            metadata: Metadata::new(),
            document_id: "doc".to_string(),
            index: 0,
        }
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let store = InMemoryVectorStore::new();
        let first = store.ensure_collection("x").await.unwrap();
        let second = store.ensure_collection("x").await.unwrap();
        assert_eq!(first, second);

        store.add(&first, &[chunk("a")], &[vec![1.0, 0.0]], None).await.unwrap();
        assert_eq!(store.count(&second).await.unwrap(), 1);
        assert_eq!(store.list_collections().await.unwrap(), vec!["x"]);
    }

    #[tokio::test]
    async fn foreign_handles_are_rejected() {
        let store = InMemoryVectorStore::new();
        let other = InMemoryVectorStore::new();
        let handle = other.ensure_collection("docs").await.unwrap();

        let err = store.search(&handle, &[1.0], 3).await.unwrap_err();
        assert!(matches!(err, RagError::CollectionNotInitialized(name) if name == "docs"));

        let forged = CollectionHandle::new(store.id, "never-created");
        assert!(matches!(
            store.count(&forged).await,
            Err(RagError::CollectionNotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn metric_switch_is_refused_once_populated() {
        let store = InMemoryVectorStore::new();
        let handle = store.ensure_collection_with_metric("docs", Metric::Euclidean).await.unwrap();
        store.ensure_collection_with_metric("docs", Metric::Cosine).await.unwrap();
        store.add(&handle, &[chunk("a")], &[vec![1.0]], None).await.unwrap();

        let err = store.ensure_collection_with_metric("docs", Metric::Euclidean).await.unwrap_err();
        assert!(matches!(err, RagError::MetricMismatch { .. }));
        // Plain ensure keeps whatever metric the collection has.
        assert!(store.ensure_collection("docs").await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_creates_yield_one_collection() {
        let store = Arc::new(InMemoryVectorStore::new());
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.ensure_collection("shared").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.list_collections().await.unwrap(), vec!["shared"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_and_searches_keep_every_record() {
        let store = Arc::new(InMemoryVectorStore::new());
        let handle = store.ensure_collection("shared").await.unwrap();

        let writers: Vec<_> = (0..16)
            .map(|writer| {
                let store = store.clone();
                let handle = handle.clone();
                tokio::spawn(async move {
                    for i in 0..10 {
                        let text = format!("writer {writer} record {i}");
                        let embedding = vec![1.0, writer as f32, i as f32];
                        store.add(&handle, &[chunk(&text)], &[embedding], None).await.unwrap();
                    }
                })
            })
            .collect();
        let reader = {
            let store = store.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let results = store.search(&handle, &[1.0, 0.0, 0.0], 5).await.unwrap();
                    assert!(results.len() <= 5);
                    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
                    tokio::task::yield_now().await;
                }
            })
        };

        for task in writers {
            task.await.unwrap();
        }
        reader.await.unwrap();
        assert_eq!(store.count(&handle).await.unwrap(), 160);
    }
}
