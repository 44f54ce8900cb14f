//! Document chunking.
//!
//! Text is whitespace-normalized first so that chunk boundaries are stable
//! across re-ingestion of semantically identical input, then cut into
//! fixed-size character windows advancing by `size - overlap`.

use std::sync::LazyLock;

use regex::Regex;

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no text after normalization.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Collapse runs of whitespace into one space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Cut `text` into windows of `size` characters advancing by `size - overlap`.
///
/// The text is whitespace-normalized first. The final window may be shorter
/// than `size`. Empty input yields no windows.
///
/// # Errors
///
/// Returns [`RagError::Chunking`] unless `size > 0` and `overlap < size`.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    validate(size, overlap)?;
    let chars: Vec<char> = normalize_whitespace(text).chars().collect();
    let stride = size.saturating_sub(overlap).max(1);

    let mut windows = Vec::new();
    let mut offset = 0;
    while offset < chars.len() {
        let end = (offset + size).min(chars.len());
        windows.push(chars[offset..end].iter().collect());
        offset += stride;
    }
    Ok(windows)
}

fn validate(size: usize, overlap: usize) -> Result<()> {
    if size == 0 {
        return Err(RagError::Chunking("chunk size must be greater than zero".to_string()));
    }
    if overlap >= size {
        return Err(RagError::Chunking(format!(
            "chunk overlap ({overlap}) must be less than chunk size ({size})"
        )));
    }
    Ok(())
}

/// Splits text into fixed-size character windows with configurable overlap.
///
/// Each chunk records its document id and its sequence number, from which
/// the stable point id is derived.
///
/// # Example
///
/// ```rust,ignore
/// use ragline_retrieval::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(400, 120)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Chunking`] unless `chunk_size > 0` and
    /// `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        // Parameters were validated in `new`.
        let windows =
            chunk_text(&document.text, self.chunk_size, self.chunk_overlap).unwrap_or_default();
        windows
            .into_iter()
            .enumerate()
            .map(|(sequence, text)| Chunk { text, source_doc: document.id.clone(), sequence })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b   c  "), "a b c");
        assert_eq!(normalize_whitespace("\n\n"), "");
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", 10, 2).unwrap().is_empty());
        assert!(chunk_text("   \n ", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(chunk_text("abc", 0, 0), Err(RagError::Chunking(_))));
        assert!(matches!(chunk_text("abc", 5, 5), Err(RagError::Chunking(_))));
        assert!(FixedSizeChunker::new(5, 7).is_err());
    }

    #[test]
    fn test_stride_and_short_final_chunk() {
        let chunks =
            chunk_text("The quick brown fox. The quick brown fox.", 20, 5).unwrap();
        assert_eq!(chunks, vec!["The quick brown fox.", " fox. The quick brow", " brown fox."]);
    }

    #[test]
    fn test_multibyte_text_is_split_on_characters() {
        let chunks = chunk_text("äöüß€", 2, 0).unwrap();
        assert_eq!(chunks, vec!["äö", "üß", "€"]);
    }

    #[test]
    fn test_chunker_sets_source_and_sequence() {
        let chunker = FixedSizeChunker::new(4, 1).unwrap();
        let chunks = chunker.chunk(&Document::new("doc7", "abcdefghij"));
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.source_doc == "doc7"));
        assert_eq!(chunks.iter().map(|c| c.sequence).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(chunks[1].text, "defg");
    }
}
