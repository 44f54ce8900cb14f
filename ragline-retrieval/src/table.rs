//! Embedding tables: the columnar record set that connects offline embedding
//! runs to bulk indexing and evaluation.
//!
//! Tables are stored as JSON lines, one row per chunk:
//!
//! ```text
//! {"id": 17, "text": "...", "embedding": [0.01, ...]}
//! {"text": "...", "embedding": [...], "source_doc": "doc0", "sequence": 3}
//! ```
//!
//! `vector` is accepted as an alias of `embedding`. Point ids are stable
//! across re-runs: an explicit `id` wins, then `source_doc` + `sequence`,
//! then the text content. Row order never determines identity.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::document::{Chunk, EmbeddingVector, IndexedPoint, PointId};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};

/// One row of an embedding table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PointId>,
    pub text: String,
    #[serde(alias = "vector")]
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<usize>,
}

impl TableRow {
    /// The stable point id of this row.
    pub fn point_id(&self) -> PointId {
        match (&self.id, &self.source_doc, self.sequence) {
            (Some(id), _, _) => id.clone().normalized(),
            (None, Some(source), Some(sequence)) => PointId::derived(source, sequence),
            _ => PointId::from_content(&self.text),
        }
    }

    /// Convert this row into an indexable point.
    pub fn to_point(&self) -> IndexedPoint {
        let mut point = IndexedPoint::new(
            self.point_id(),
            EmbeddingVector::from_values(self.embedding.clone()),
            self.text.clone(),
        );
        if let Some(source) = &self.source_doc {
            point.payload.insert("source_doc".to_string(), Value::String(source.clone()));
        }
        if let Some(sequence) = self.sequence {
            point.payload.insert("sequence".to_string(), Value::from(sequence));
        }
        point
    }
}

/// An in-memory embedding table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingTable {
    pub rows: Vec<TableRow>,
}

impl EmbeddingTable {
    pub fn new(rows: Vec<TableRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Embed `chunks` through `embedder` and build a table from them.
    pub async fn from_chunks(embedder: &Embedder, chunks: &[Chunk]) -> Result<Self> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = embedder.embed(&texts).await?;
        let rows = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| TableRow {
                id: None,
                text: chunk.text.clone(),
                embedding: vector.values,
                source_doc: Some(chunk.source_doc.clone()),
                sequence: Some(chunk.sequence),
            })
            .collect::<Vec<_>>();
        info!(rows = rows.len(), model = %embedder.spec().name, "built embedding table");
        Ok(Self { rows })
    }

    /// The shared dimension of all rows.
    ///
    /// # Errors
    ///
    /// [`RagError::Config`] for an empty table, [`RagError::DimensionMismatch`]
    /// if rows disagree.
    pub fn dim(&self) -> Result<usize> {
        let first = self
            .rows
            .first()
            .ok_or_else(|| RagError::Config("embedding table is empty".to_string()))?;
        let dim = first.embedding.len();
        if dim == 0 {
            return Err(RagError::Config("embedding table has zero-length vectors".to_string()));
        }
        let mismatch = self.rows.iter().enumerate().find(|(_, r)| r.embedding.len() != dim);
        if let Some((row, bad)) = mismatch {
            return Err(RagError::DimensionMismatch {
                context: format!("embedding table row {row}"),
                expected: dim,
                actual: bad.embedding.len(),
            });
        }
        Ok(dim)
    }

    /// Convert all rows into points, checking dimensions and id uniqueness.
    pub fn to_points(&self) -> Result<Vec<IndexedPoint>> {
        self.dim()?;
        let points: Vec<IndexedPoint> = self.rows.iter().map(TableRow::to_point).collect();
        let mut seen = std::collections::HashSet::with_capacity(points.len());
        if let Some(duplicate) = points.iter().find(|p| !seen.insert(&p.id)) {
            return Err(RagError::Config(format!(
                "embedding table contains duplicate point id {}",
                duplicate.id
            )));
        }
        Ok(points)
    }

    /// Read a JSON-lines table. Blank lines are skipped.
    pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| RagError::io(path, e))?;
        let mut rows = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| RagError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let row: TableRow = serde_json::from_str(&line).map_err(|e| {
                RagError::Serialization(format!("{}:{}: {e}", path.display(), number + 1))
            })?;
            rows.push(row);
        }
        Ok(Self { rows })
    }

    /// Write the table as JSON lines, creating parent directories.
    pub fn save_jsonl(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| RagError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for row in &self.rows {
            serde_json::to_writer(&mut writer, row)
                .map_err(|e| RagError::Serialization(e.to_string()))?;
            writer.write_all(b"\n").map_err(|e| RagError::io(path, e))?;
        }
        writer.flush().map_err(|e| RagError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(text: &str, embedding: Vec<f32>) -> TableRow {
        TableRow { id: None, text: text.into(), embedding, source_doc: None, sequence: None }
    }

    #[test]
    fn test_point_id_precedence() {
        let mut r = row("text", vec![1.0]);
        assert_eq!(r.point_id(), PointId::from_content("text"));

        r.source_doc = Some("doc1".into());
        r.sequence = Some(2);
        assert_eq!(r.point_id(), PointId::derived("doc1", 2));

        r.id = Some(PointId::Num(5));
        assert_eq!(r.point_id(), PointId::Num(5));
    }

    #[test]
    fn test_ids_do_not_depend_on_row_order() {
        let a = row("alpha", vec![1.0, 0.0]);
        let b = row("beta", vec![0.0, 1.0]);
        let forward = EmbeddingTable::new(vec![a.clone(), b.clone()]).to_points().unwrap();
        let reversed = EmbeddingTable::new(vec![b, a]).to_points().unwrap();
        assert_eq!(forward[0].id, reversed[1].id);
        assert_eq!(forward[1].id, reversed[0].id);
    }

    #[test]
    fn test_dim_checks() {
        assert!(matches!(EmbeddingTable::default().dim(), Err(RagError::Config(_))));
        let mixed = EmbeddingTable::new(vec![row("a", vec![1.0, 0.0]), row("b", vec![1.0])]);
        assert!(matches!(
            mixed.dim(),
            Err(RagError::DimensionMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let table = EmbeddingTable::new(vec![row("same", vec![1.0]), row("same", vec![0.5])]);
        assert!(matches!(table.to_points(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_vector_column_alias() {
        let parsed: TableRow = serde_json::from_str(r#"{"text":"t","vector":[0.5,0.5]}"#).unwrap();
        assert_eq!(parsed.embedding, vec![0.5, 0.5]);
    }

    #[test]
    fn test_payload_carries_provenance() {
        let mut r = row("passage", vec![1.0]);
        r.source_doc = Some("doc3".into());
        r.sequence = Some(4);
        let point = r.to_point();
        assert_eq!(point.text(), Some("passage"));
        assert_eq!(point.payload["source_doc"], "doc3");
        assert_eq!(point.payload["sequence"], 4);
    }

    #[test]
    fn test_jsonl_file_round_trip_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("embeddings.jsonl");
        let table = EmbeddingTable::new(vec![row("a", vec![1.0, 0.0]), row("b", vec![0.0, 1.0])]);
        table.save_jsonl(&path).unwrap();

        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("\n   \n");
        std::fs::write(&path, contents).unwrap();

        assert_eq!(EmbeddingTable::load_jsonl(&path).unwrap(), table);
    }
}
