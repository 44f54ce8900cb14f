//! recall@k over a labeled query set.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use ragline_retrieval::Embedder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EvalError, Result};
use crate::exact::ExactIndex;
use crate::queries::EvalQuery;

/// Per-query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub question: String,
    /// Zero-based rank of the first passage containing an answer.
    pub first_hit_rank: Option<usize>,
}

impl QueryOutcome {
    pub fn hit(&self) -> bool {
        self.first_hit_rank.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub k: usize,
    pub recall: f64,
    pub outcomes: Vec<QueryOutcome>,
}

impl EvalReport {
    /// Metrics keyed the way tracking servers expect, e.g. `recall@8`.
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([(format!("recall@{}", self.k), self.recall)])
    }

    /// Write [`metrics`](Self::metrics) as pretty JSON, creating parent directories.
    pub fn write_metrics(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.metrics())
            .map_err(|e| EvalError::Serialization(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| EvalError::io(path, e))
    }
}

/// Replays queries through the [`Embedder`] and an [`ExactIndex`].
pub struct Evaluator {
    embedder: Arc<Embedder>,
    k: usize,
}

impl Evaluator {
    pub fn new(embedder: Arc<Embedder>, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(EvalError::InvalidK);
        }
        Ok(Self { embedder, k })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Fraction of `queries` with an acceptable answer among the top `k` rows.
    pub async fn evaluate(&self, index: &ExactIndex, queries: &[EvalQuery]) -> Result<EvalReport> {
        if queries.is_empty() {
            return Err(EvalError::EmptyQuerySet);
        }
        if self.embedder.dimensions() != index.dim() {
            return Err(ragline_retrieval::RagError::DimensionMismatch {
                context: "evaluation table vs embedding model".to_string(),
                expected: self.embedder.dimensions(),
                actual: index.dim(),
            }
            .into());
        }

        let questions: Vec<&str> = queries.iter().map(|q| q.question.as_str()).collect();
        let vectors = self.embedder.embed(&questions).await?;

        let mut outcomes = Vec::with_capacity(queries.len());
        for (query, vector) in queries.iter().zip(&vectors) {
            let hits = index.search(&vector.values, self.k)?;
            let first_hit_rank =
                hits.iter().position(|(row, _)| query.is_answered_by(index.text(*row)));
            debug!(question = %query.question, ?first_hit_rank, "evaluated query");
            outcomes.push(QueryOutcome { question: query.question.clone(), first_hit_rank });
        }

        let hits = outcomes.iter().filter(|o| o.hit()).count();
        let recall = hits as f64 / outcomes.len() as f64;
        info!(k = self.k, queries = outcomes.len(), hits, recall, "evaluation finished");
        Ok(EvalReport { k: self.k, recall, outcomes })
    }
}
