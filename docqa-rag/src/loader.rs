//! Loading documents from the filesystem.
//!
//! [`load_path`] accepts a single file or a directory. Directories are walked
//! recursively for `*.pdf` and `*.txt` files. A file that cannot be read or
//! decoded is logged and skipped; only a missing path is an error.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// Metadata key holding the path a document was loaded from.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the 0-based page number of a PDF page.
pub const PAGE_KEY: &str = "page";

/// Page separator emitted by the PDF text extractor.
#[cfg_attr(not(feature = "pdf"), allow(dead_code))]
const PAGE_BREAK: char = '\x0c';

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Find every PDF and text file under `root`: all PDFs first, then all text files, each sorted.
fn discover(root: &Path) -> Vec<PathBuf> {
    let files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    let mut pdfs: Vec<PathBuf> = files.iter().filter(|p| has_extension(p, "pdf")).cloned().collect();
    let mut texts: Vec<PathBuf> = files.into_iter().filter(|p| has_extension(p, "txt")).collect();
    pdfs.sort();
    texts.sort();
    pdfs.extend(texts);
    pdfs
}

/// Load all documents at `path`.
///
/// # Errors
///
/// Returns [`RagError::PathNotFound`] if `path` does not exist and
/// [`RagError::Storage`] if it exists but cannot be inspected.
pub async fn load_path(path: impl AsRef<Path>) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RagError::PathNotFound(path.to_path_buf()),
        _ => RagError::storage("filesystem", format!("{}: {e}", path.display())),
    })?;

    if !metadata.is_dir() {
        let documents = load_file(path).await;
        info!(path = %path.display(), document_count = documents.len(), "loaded file");
        return Ok(documents);
    }

    let root = path.to_path_buf();
    let files = tokio::task::spawn_blocking(move || discover(&root))
        .await
        .map_err(|e| RagError::storage("filesystem", format!("directory walk failed: {e}")))?;

    let mut documents = Vec::new();
    for file in &files {
        documents.extend(load_file(file).await);
    }
    info!(
        path = %path.display(),
        file_count = files.len(),
        document_count = documents.len(),
        "loaded directory"
    );
    Ok(documents)
}

/// Load one file, dispatching on its extension. Failures yield no documents.
async fn load_file(path: &Path) -> Vec<Document> {
    if has_extension(path, "pdf") { load_pdf(path).await } else { load_text(path).await }
}

async fn load_text(path: &Path) -> Vec<Document> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read text file, skipping");
            return Vec::new();
        }
    };
    match String::from_utf8(bytes) {
        Ok(content) => {
            let source = path.display().to_string();
            debug!(path = %source, chars = content.chars().count(), "loaded text file");
            vec![Document::new(source.clone(), content).with_metadata(SOURCE_KEY, source)]
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "text file is not valid UTF-8, skipping");
            Vec::new()
        }
    }
}

#[cfg(feature = "pdf")]
async fn load_pdf(path: &Path) -> Vec<Document> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read PDF, skipping");
            return Vec::new();
        }
    };

    let extracted =
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;
    let text = match extracted {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "failed to extract PDF text, skipping");
            return Vec::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "PDF extraction task failed, skipping");
            return Vec::new();
        }
    };

    let source = path.display().to_string();
    let documents = pdf_pages(&source, &text);
    debug!(path = %source, pages = documents.len(), "loaded PDF");
    documents
}

#[cfg(not(feature = "pdf"))]
async fn load_pdf(path: &Path) -> Vec<Document> {
    warn!(path = %path.display(), "PDF support is disabled, skipping");
    Vec::new()
}

/// One document per non-blank page of extracted PDF text.
#[cfg_attr(not(feature = "pdf"), allow(dead_code))]
fn pdf_pages(source: &str, text: &str) -> Vec<Document> {
    text.split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(page, content)| {
            Document::new(format!("{source}#page={page}"), content)
                .with_metadata(SOURCE_KEY, source)
                .with_metadata(PAGE_KEY, page as i64)
        })
        .collect()
}
