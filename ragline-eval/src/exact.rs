//! Brute-force nearest neighbours over an embedding table.

use ragline_retrieval::{EmbeddingTable, Metric, RagError};

use crate::error::Result;

/// Exact cosine k-NN over every row of an [`EmbeddingTable`].
///
/// Scores every row for every query; ties keep table order.
#[derive(Debug, Clone)]
pub struct ExactIndex {
    table: EmbeddingTable,
    dim: usize,
}

impl ExactIndex {
    /// Index `table`. Every row must share one non-zero dimension.
    pub fn new(table: EmbeddingTable) -> Result<Self> {
        let dim = table.dim()?;
        Ok(Self { table, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The `k` rows most similar to `query` as `(row, score)`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dim {
            return Err(RagError::DimensionMismatch {
                context: "exact index query".to_string(),
                expected: self.dim,
                actual: query.len(),
            }
            .into());
        }
        let mut scored: Vec<(usize, f32)> = self
            .table
            .rows
            .iter()
            .enumerate()
            .map(|(row, r)| (row, Metric::Cosine.score(&r.embedding, query)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    /// Passage text of `row`.
    pub fn text(&self, row: usize) -> &str {
        self.table.rows.get(row).map(|r| r.text.as_str()).unwrap_or_default()
    }
}
