//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits text at the largest natural boundary that keeps every chunk within
//! `chunk_size` characters: paragraphs, then lines, then sentences, then words,
//! and finally individual characters.

use std::collections::VecDeque;

use crate::config::RagConfig;
use crate::document::{Chunk, Document};

/// Separators tried in order, from the coarsest boundary to the finest.
/// The empty separator splits between characters.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " ", ""];

/// A strategy for splitting documents into chunks.
///
/// Chunks carry the parent document's metadata unchanged. Chunks are the
/// unit of embedding and retrieval, so the same chunker must be used for
/// every document indexed into a collection.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no non-whitespace text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;

    /// Split several documents, keeping document order.
    fn chunk_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|document| self.chunk(document)).collect()
    }
}

/// Splits text hierarchically with a fixed separator ladder and overlap.
///
/// Pieces produced by a separator keep the separator attached to their end
/// and are merged greedily up to `chunk_size` characters. When a chunk is
/// emitted, the trailing pieces that fit within `chunk_overlap` characters
/// start the next chunk, so at the character level adjacent chunks share
/// exactly `chunk_overlap` characters. Emitted chunks are whitespace-trimmed.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(512, 50);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk (at least 1)
    /// * `chunk_overlap` — number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), chunk_overlap }
    }

    /// Create a chunker using the sizes from a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Maximum chunk length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap between adjacent chunks in characters.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, finer) =
            match separators.iter().position(|sep| sep.is_empty() || text.contains(sep)) {
                Some(i) => (separators[i], &separators[i + 1..]),
                None => ("", &[][..]),
            };

        let pieces = if separator.is_empty() {
            split_chars(text)
        } else {
            split_keeping_separator(text, separator)
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                push_trimmed(&mut chunks, piece);
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    /// Merge small pieces into chunks of at most `chunk_size` characters,
    /// carrying up to `chunk_overlap` characters of trailing pieces forward.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                let joined: String = window.iter().map(|(p, _)| *p).collect();
                push_trimmed(&mut chunks, &joined);

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        if !window.is_empty() {
            let joined: String = window.iter().map(|(p, _)| *p).collect();
            push_trimmed(&mut chunks, &joined);
        }

        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.content.trim().is_empty() {
            return Vec::new();
        }

        self.split_text(&document.content)
            .into_iter()
            .enumerate()
            .map(|(index, content)| Chunk {
                content,
                metadata: document.metadata.clone(),
                document_id: document.id.clone(),
                index,
            })
            .collect()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Split text into one slice per character.
fn split_chars(text: &str) -> Vec<&str> {
    text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_documents_yield_no_chunks() {
        let chunker = RecursiveChunker::new(10, 2);
        assert!(chunker.chunk(&Document::new("empty", "")).is_empty());
        assert!(chunker.chunk(&Document::new("blank", "  \n\n  ")).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = RecursiveChunker::new(100, 10);
        let chunks = chunker.chunk(&Document::new("doc", "A short note."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "A short note.");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn splits_at_sentence_boundaries_first() {
        let chunker = RecursiveChunker::new(10, 2);
        let chunks = chunker.split_text("Alpha. Beta. Gamma.\n");
        assert_eq!(chunks, vec!["Alpha.", "Beta.", "Gamma."]);
    }

    #[test]
    fn prefers_paragraphs_over_lines() {
        let chunker = RecursiveChunker::new(25, 0);
        let text = "first paragraph\nstill\n\nsecond one";
        let chunks = chunker.split_text(text);
        assert_eq!(chunks, vec!["first paragraph\nstill", "second one"]);
    }

    #[test]
    fn character_level_split_has_exact_overlap() {
        let chunker = RecursiveChunker::new(10, 3);
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunker.split_text(text);
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "hijklmnopq");
        for pair in chunks.windows(2) {
            let tail = &pair[0][pair[0].len() - 3..];
            assert_eq!(tail, &pair[1][..3]);
        }
    }

    #[test]
    fn word_level_overlap_carries_trailing_words() {
        let chunker = RecursiveChunker::new(16, 6);
        let chunks = chunker.split_text("one two three four five six");
        assert!(chunks.iter().all(|c| c.chars().count() <= 16));
        assert_eq!(chunks[0], "one two three");
        assert!(chunks[1].starts_with("three"));
    }

    #[test]
    fn handles_multibyte_characters() {
        let chunker = RecursiveChunker::new(4, 1);
        let chunks = chunker.split_text("héllöwörld");
        assert_eq!(chunks, vec!["héll", "löwö", "örld"]);
    }

    #[test]
    fn chunks_inherit_metadata_unchanged() {
        let chunker = RecursiveChunker::new(10, 2);
        let doc = Document::new("notes.txt", "Alpha. Beta. Gamma.")
            .with_metadata("source", "notes.txt");
        let chunks = chunker.chunk(&doc);
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata, doc.metadata);
            assert_eq!(chunk.document_id, "notes.txt");
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn chunk_all_keeps_documents_apart() {
        let chunker = RecursiveChunker::new(50, 5);
        let docs = vec![Document::new("a", "first document"), Document::new("b", "second document")];
        let chunks = chunker.chunk_all(&docs);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].document_id, "a");
        assert_eq!(chunks[1].document_id, "b");
        assert_eq!(chunks[1].index, 0);
    }
}
