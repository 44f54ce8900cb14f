//! Ingestion artifacts on disk.
//!
//! Source documents are `*.md` files; chunks are written one per file as
//! `doc{N}_chunk{M}.txt`, where `N` is the document's position in sorted
//! source order and `M` the chunk sequence. Reading a chunk directory orders
//! files by the numeric `(N, M)` pair, so `doc0_chunk10.txt` follows
//! `doc0_chunk9.txt`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::chunking::Chunker;
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

static CHUNK_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^doc(\d+)_chunk(\d+)\.txt$").expect("valid regex"));

/// File name of chunk `sequence` of the `doc_index`-th document.
pub fn chunk_file_name(doc_index: usize, sequence: usize) -> String {
    format!("doc{doc_index}_chunk{sequence}.txt")
}

fn parse_chunk_file_name(name: &str) -> Option<(usize, usize)> {
    let captures = CHUNK_FILE.captures(name)?;
    Some((captures[1].parse().ok()?, captures[2].parse().ok()?))
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)
        .map_err(|e| RagError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()).map_err(|e| RagError::io(dir, e)))
        .collect::<Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

/// Load every `*.md` file in `dir`, in sorted path order.
///
/// The file stem becomes the document id and the path its `source_uri`.
pub fn load_documents(dir: impl AsRef<Path>) -> Result<Vec<Document>> {
    let dir = dir.as_ref();
    let mut documents = Vec::new();
    for path in read_dir_sorted(dir)? {
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "md") {
            continue;
        }
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text = fs::read_to_string(&path).map_err(|e| RagError::io(&path, e))?;
        let mut document = Document::new(id, text);
        document.source_uri = Some(path.display().to_string());
        documents.push(document);
    }
    info!(dir = %dir.display(), documents = documents.len(), "loaded source documents");
    Ok(documents)
}

/// Chunk `documents` and write one file per chunk into `out_dir`.
///
/// Chunk files already in `out_dir` are removed first so a shorter corpus
/// never leaves stale chunks behind. Returns the chunks in file order.
pub fn write_chunk_files(
    out_dir: impl AsRef<Path>,
    documents: &[Document],
    chunker: &dyn Chunker,
) -> Result<Vec<Chunk>> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).map_err(|e| RagError::io(out_dir, e))?;

    let mut removed = 0;
    for path in read_dir_sorted(out_dir)? {
        let stale = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| CHUNK_FILE.is_match(name));
        if stale && path.is_file() {
            fs::remove_file(&path).map_err(|e| RagError::io(&path, e))?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!(dir = %out_dir.display(), removed, "cleared previous chunk files");
    }

    let mut written = Vec::new();
    for (doc_index, document) in documents.iter().enumerate() {
        for chunk in chunker.chunk(document) {
            let path = out_dir.join(chunk_file_name(doc_index, chunk.sequence));
            fs::write(&path, &chunk.text).map_err(|e| RagError::io(&path, e))?;
            written.push(chunk);
        }
    }
    info!(dir = %out_dir.display(), chunks = written.len(), "wrote chunk files");
    Ok(written)
}

/// Read a chunk directory written by [`write_chunk_files`].
///
/// Files not named `doc{N}_chunk{M}.txt` are ignored. Chunks come back with
/// `source_doc = "doc{N}"` and `sequence = M`, ordered by `(N, M)`.
pub fn load_chunk_files(dir: impl AsRef<Path>) -> Result<Vec<Chunk>> {
    let dir = dir.as_ref();
    let mut indexed = Vec::new();
    for path in read_dir_sorted(dir)? {
        let Some(key) = path.file_name().and_then(|n| n.to_str()).and_then(parse_chunk_file_name)
        else {
            continue;
        };
        indexed.push((key, path));
    }
    indexed.sort_by_key(|(key, _)| *key);

    indexed
        .into_iter()
        .map(|((doc_index, sequence), path)| {
            let text = fs::read_to_string(&path).map_err(|e| RagError::io(&path, e))?;
            Ok(Chunk { text, source_doc: format!("doc{doc_index}"), sequence })
        })
        .collect()
}
