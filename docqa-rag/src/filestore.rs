//! Durable vector store backed by one JSON file per collection.
//!
//! [`FileVectorStore`] keeps every collection it has touched in memory and
//! mirrors it to `<root>/<name>.collection.json`. Files are replaced
//! atomically (write to a temporary file in the same directory, fsync,
//! rename), and a write is on disk before [`VectorStore::add`] returns.
//! Collections written by an earlier process are loaded the first time they
//! are referenced by name. Loading happens outside the store-wide registry
//! lock, so other collections stay searchable while a large one is read.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::collection::{CollectionSlot, CollectionState, Record, validate_collection_name};
use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::similarity::Metric;
use crate::vectorstore::{CollectionHandle, VectorStore};

const BACKEND: &str = "file";
const FILE_SUFFIX: &str = ".collection.json";

/// Borrowed view of a collection used to serialise a pending write without
/// copying the existing records.
#[derive(Serialize)]
struct CollectionFile<'a> {
    name: &'a str,
    metric: Metric,
    dimension: Option<usize>,
    created_at: DateTime<Utc>,
    records: Vec<&'a Record>,
}

impl<'a> CollectionFile<'a> {
    fn of(state: &'a CollectionState, pending: &'a [Record]) -> Self {
        Self {
            name: &state.name,
            metric: state.metric,
            dimension: state.dimension.or_else(|| pending.first().map(|r| r.embedding.len())),
            created_at: state.created_at,
            records: state.records.iter().chain(pending).collect(),
        }
    }
}

/// A [`VectorStore`] persisted under a directory on the local filesystem.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{FileVectorStore, VectorStore};
///
/// let store = FileVectorStore::open("./vector_db").await?;
/// let docs = store.ensure_collection("docs").await?;
/// store.add(&docs, &chunks, &embeddings, None).await?;
/// ```
#[derive(Debug)]
pub struct FileVectorStore {
    id: Uuid,
    root: PathBuf,
    collections: RwLock<HashMap<String, Arc<OnceCell<Arc<CollectionSlot>>>>>,
}

impl FileVectorStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Storage`] if the directory cannot be created.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| RagError::storage(BACKEND, format!("{}: {e}", root.display())))?;
        info!(path = %root.display(), "opened vector store");
        Ok(Self { id: Uuid::new_v4(), root, collections: RwLock::new(HashMap::new()) })
    }

    /// The directory this store persists to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{FILE_SUFFIX}"))
    }

    async fn load(&self, name: &str) -> Result<Option<CollectionState>> {
        let path = self.path_for(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RagError::storage(BACKEND, format!("{}: {e}", path.display()))),
        };
        let state: CollectionState = serde_json::from_slice(&bytes).map_err(|e| {
            RagError::storage(BACKEND, format!("corrupt collection file {}: {e}", path.display()))
        })?;
        if state.name != name {
            return Err(RagError::storage(
                BACKEND,
                format!("{} holds collection '{}'", path.display(), state.name),
            ));
        }
        debug!(collection = name, records = state.len(), "loaded collection from disk");
        Ok(Some(state))
    }

    async fn persist(&self, state: &CollectionState, pending: &[Record]) -> Result<()> {
        let bytes = serde_json::to_vec(&CollectionFile::of(state, pending))
            .map_err(|e| RagError::storage(BACKEND, format!("serialize: {e}")))?;
        let dir = self.root.clone();
        let path = self.path_for(&state.name);

        tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &bytes))
            .await
            .map_err(|e| RagError::storage(BACKEND, format!("write task failed: {e}")))?
    }

    async fn load_or_create(&self, name: &str, metric: Option<Metric>) -> Result<Arc<CollectionSlot>> {
        let state = match self.load(name).await? {
            Some(state) => state,
            None => {
                let state = CollectionState::new(name, metric.unwrap_or_default());
                self.persist(&state, &[]).await?;
                info!(collection = name, metric = %state.metric, "created collection");
                state
            }
        };
        Ok(Arc::new(CollectionSlot::new(state)))
    }

    async fn open_collection(&self, name: &str, metric: Option<Metric>) -> Result<CollectionHandle> {
        validate_collection_name(name)?;

        let cell = {
            let existing = self.collections.read().await.get(name).cloned();
            match existing {
                Some(cell) => cell,
                None => self.collections.write().await.entry(name.to_string()).or_default().clone(),
            }
        };
        // A failed load leaves the cell empty and the next caller retries.
        let slot = cell.get_or_try_init(|| self.load_or_create(name, metric)).await?.clone();

        if let Some(metric) = metric {
            let _writer = slot.writer.lock().await;
            let needs_switch = slot.state.read().await.check_metric(metric)?;
            if needs_switch {
                let mut switched = slot.state.read().await.clone();
                switched.metric = metric;
                self.persist(&switched, &[]).await?;
                slot.state.write().await.metric = metric;
                info!(collection = name, %metric, "switched collection metric");
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
            .and_then(|cell| cell.get().cloned())
            .ok_or_else(|| RagError::CollectionNotInitialized(handle.name().to_string()))
    }
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |e: std::io::Error| RagError::storage(BACKEND, format!("{}: {e}", path.display()));

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.as_file().sync_all().map_err(io_err)?;
    file.persist(path).map_err(|e| io_err(e.error))?;

    // Make the rename itself durable.
    #[cfg(unix)]
    std::fs::File::open(dir).and_then(|d| d.sync_all()).map_err(io_err)?;
    Ok(())
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn ensure_collection(&self, name: &str) -> Result<CollectionHandle> {
        self.open_collection(name, None).await
    }

    async fn ensure_collection_with_metric(
        &self,
        name: &str,
        metric: Metric,
    ) -> Result<CollectionHandle> {
        self.open_collection(name, Some(metric)).await
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

        let records = {
            let state = slot.state.read().await;
            let records = state.prepare(chunks, embeddings, ids)?;
            if records.is_empty() {
                return Ok(Vec::new());
            }
            self.persist(&state, &records).await?;
            records
        };

        let written: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        slot.state.write().await.commit(records);

        debug!(collection = handle.name(), count = written.len(), "persisted records");
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
        let mut names: Vec<String> = self
            .collections
            .read()
            .await
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| RagError::storage(BACKEND, format!("{}: {e}", self.root.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RagError::storage(BACKEND, format!("{}: {e}", self.root.display())))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(FILE_SUFFIX)) else {
                continue;
            };
            if validate_collection_name(name).is_ok() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}
