//! Record storage shared by the vector store implementations.
//!
//! A [`CollectionState`] holds the records of one collection together with
//! the metric and dimension they were indexed with. Every write is split
//! into [`CollectionState::prepare`], which validates a batch without
//! touching the collection, and [`CollectionState::commit`], which cannot
//! fail. Stores persist between the two steps, so a failed validation or a
//! failed write leaves the collection exactly as it was.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::document::{Chunk, Metadata, SearchResult};
use crate::error::{RagError, Result};
use crate::similarity::Metric;

/// One stored (id, embedding, text, metadata) record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Unique id within the collection.
    pub id: String,
    /// The chunk text.
    pub text: String,
    /// The chunk metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// The chunk embedding.
    pub embedding: Vec<f32>,
}

/// The contents of one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionState {
    /// Collection name.
    pub name: String,
    /// Metric the collection is searched with.
    pub metric: Metric,
    /// Dimension established by the first insert.
    pub dimension: Option<usize>,
    /// When the collection was first created.
    pub created_at: DateTime<Utc>,
    /// Stored records in insertion order.
    #[serde(default)]
    pub records: Vec<Record>,
}

impl CollectionState {
    /// Create an empty collection.
    pub fn new(name: &str, metric: Metric) -> Self {
        Self {
            name: name.to_string(),
            metric,
            dimension: None,
            created_at: Utc::now(),
            records: Vec::new(),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check whether the collection may be used with `requested`.
    ///
    /// Returns `true` if the metric has to change, which is only allowed
    /// while the collection is empty.
    pub fn check_metric(&self, requested: Metric) -> Result<bool> {
        if self.metric == requested {
            return Ok(false);
        }
        if !self.is_empty() {
            return Err(RagError::MetricMismatch {
                collection: self.name.clone(),
                existing: self.metric,
                requested,
            });
        }
        Ok(true)
    }

    /// Validate a batch and turn it into records without modifying the collection.
    ///
    /// # Errors
    ///
    /// - [`RagError::LengthMismatch`] if chunks, embeddings and ids differ in length
    /// - [`RagError::DimensionMismatch`] if an embedding's dimension differs from the
    ///   collection's dimension (or, for the first insert, from the batch's first embedding)
    /// - [`RagError::DuplicateId`] if an id repeats within the batch or already exists
    pub fn prepare(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
        ids: Option<&[String]>,
    ) -> Result<Vec<Record>> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::LengthMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        if let Some(ids) = ids {
            if ids.len() != chunks.len() {
                return Err(RagError::LengthMismatch { chunks: chunks.len(), embeddings: ids.len() });
            }
        }

        let expected = self.dimension.or_else(|| embeddings.first().map(Vec::len));
        if let Some(expected) = expected {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
                return Err(RagError::DimensionMismatch {
                    collection: self.name.clone(),
                    expected,
                    actual: bad.len(),
                });
            }
        }

        let ids: Vec<String> = match ids {
            Some(ids) => ids.to_vec(),
            None => chunks.iter().map(|_| Uuid::new_v4().to_string()).collect(),
        };

        let mut seen: HashSet<&str> = self.records.iter().map(|r| r.id.as_str()).collect();
        for id in &ids {
            if !seen.insert(id.as_str()) {
                return Err(RagError::DuplicateId {
                    collection: self.name.clone(),
                    id: id.clone(),
                });
            }
        }

        Ok(ids
            .into_iter()
            .zip(chunks.iter().zip(embeddings))
            .map(|(id, (chunk, embedding))| Record {
                id,
                text: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                embedding: embedding.clone(),
            })
            .collect())
    }

    /// Append records produced by [`prepare`](Self::prepare).
    pub fn commit(&mut self, records: Vec<Record>) {
        if self.dimension.is_none() {
            self.dimension = records.first().map(|r| r.embedding.len());
        }
        self.records.extend(records);
    }

    /// Return the `top_k` records most similar to `query`, best first.
    ///
    /// Ties keep insertion order. An empty collection yields no results.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the query's dimension differs
    /// from the collection's.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if let Some(expected) = self.dimension {
            if query.len() != expected {
                return Err(RagError::DimensionMismatch {
                    collection: self.name.clone(),
                    expected,
                    actual: query.len(),
                });
            }
        }
        if top_k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &Record)> = self
            .records
            .iter()
            .map(|record| (self.metric.score(query, &record.embedding), record))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| SearchResult {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                score,
            })
            .collect())
    }
}

/// A collection shared between concurrent requests.
///
/// `writer` serialises writers for the whole prepare/persist/commit
/// sequence; `state` is only write-locked for the commit itself, so
/// searches keep running while a write is being persisted and observe the
/// collection either before or after the write.
#[derive(Debug)]
pub struct CollectionSlot {
    /// Held by a writer for the duration of a write.
    pub writer: Mutex<()>,
    /// The collection contents.
    pub state: RwLock<CollectionState>,
}

impl CollectionSlot {
    /// Wrap a collection state.
    pub fn new(state: CollectionState) -> Self {
        Self { writer: Mutex::new(()), state: RwLock::new(state) }
    }
}

/// Check that `name` can be used as a collection name.
///
/// Names are 1–63 characters from `[A-Za-z0-9._-]` and may not start with `.`.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid { Ok(()) } else { Err(RagError::InvalidCollectionName(name.to_string())) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            content: text.to_string(),
            metadata: Metadata::new(),
            document_id: "doc".to_string(),
            index: 0,
        }
    }

    #[test]
    fn first_insert_establishes_dimension() {
        let mut state = CollectionState::new("docs", Metric::Cosine);
        let records = state.prepare(&[chunk("a")], &[vec![1.0, 0.0, 0.0]], None).unwrap();
        state.commit(records);
        assert_eq!(state.dimension, Some(3));

        let err = state.prepare(&[chunk("b")], &[vec![1.0, 0.0]], None).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2, .. }));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn mixed_dimensions_within_first_batch_are_rejected() {
        let state = CollectionState::new("docs", Metric::Cosine);
        let err = state
            .prepare(&[chunk("a"), chunk("b")], &[vec![1.0, 0.0], vec![1.0]], None)
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let state = CollectionState::new("docs", Metric::Cosine);
        let err = state.prepare(&[chunk("a"), chunk("b")], &[vec![1.0]], None).unwrap_err();
        assert!(matches!(err, RagError::LengthMismatch { chunks: 2, embeddings: 1 }));

        let ids = vec!["only-one".to_string()];
        let err = state
            .prepare(&[chunk("a"), chunk("b")], &[vec![1.0], vec![0.5]], Some(&ids))
            .unwrap_err();
        assert!(matches!(err, RagError::LengthMismatch { .. }));
    }

    #[test]
    fn generated_ids_are_unique() {
        let mut state = CollectionState::new("docs", Metric::Cosine);
        for _ in 0..3 {
            let records =
                state.prepare(&[chunk("a"), chunk("b")], &[vec![1.0], vec![2.0]], None).unwrap();
            state.commit(records);
        }
        let ids: HashSet<&str> = state.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn supplied_ids_may_not_overwrite_existing_records() {
        let mut state = CollectionState::new("docs", Metric::Cosine);
        let ids = vec!["doc_0".to_string()];
        let records = state.prepare(&[chunk("a")], &[vec![1.0]], Some(&ids)).unwrap();
        state.commit(records);

        let err = state.prepare(&[chunk("b")], &[vec![1.0]], Some(&ids)).unwrap_err();
        assert!(matches!(err, RagError::DuplicateId { ref id, .. } if id == "doc_0"));

        let repeated = vec!["x".to_string(), "x".to_string()];
        let err = state
            .prepare(&[chunk("a"), chunk("b")], &[vec![1.0], vec![1.0]], Some(&repeated))
            .unwrap_err();
        assert!(matches!(err, RagError::DuplicateId { .. }));
    }

    #[test]
    fn search_orders_by_score_and_respects_k() {
        let mut state = CollectionState::new("docs", Metric::Cosine);
        let records = state
            .prepare(
                &[chunk("east"), chunk("north"), chunk("north-east")],
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
                None,
            )
            .unwrap();
        state.commit(records);

        let results = state.search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "north");
        assert_eq!(results[1].text, "north-east");
        assert!(results[0].score >= results[1].score);

        assert!(state.search(&[0.0, 1.0], 0).unwrap().is_empty());
        assert_eq!(state.search(&[0.0, 1.0], 10).unwrap().len(), 3);
        assert!(state.search(&[0.0, 1.0, 0.0], 1).is_err());
    }

    #[test]
    fn empty_collection_search_is_empty() {
        let state = CollectionState::new("docs", Metric::Cosine);
        assert!(state.search(&[1.0, 2.0, 3.0], 5).unwrap().is_empty());
    }

    #[test]
    fn metric_can_only_change_while_empty() {
        let mut state = CollectionState::new("docs", Metric::Cosine);
        assert!(!state.check_metric(Metric::Cosine).unwrap());
        assert!(state.check_metric(Metric::Euclidean).unwrap());

        let records = state.prepare(&[chunk("a")], &[vec![1.0]], None).unwrap();
        state.commit(records);
        assert!(matches!(
            state.check_metric(Metric::Euclidean),
            Err(RagError::MetricMismatch { existing: Metric::Cosine, requested: Metric::Euclidean, .. })
        ));
    }

    #[test]
    fn collection_names_are_validated() {
        assert!(validate_collection_name("documents").is_ok());
        assert!(validate_collection_name("team_a-v1.2").is_ok());
        assert!(validate_collection_name("x").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name(".hidden").is_err());
        assert!(validate_collection_name("../etc").is_err());
        assert!(validate_collection_name("with space").is_err());
        assert!(validate_collection_name(&"a".repeat(64)).is_err());
    }
}
