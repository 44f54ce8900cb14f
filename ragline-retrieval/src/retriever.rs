//! Question → passages.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::document::{Metric, QueryResult};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorIndex;

/// Turns a question into an ordered list of candidate passages.
///
/// The Retriever never writes points. The only write it may perform is
/// first-use creation of its collection, so a freshly deployed serving
/// instance can answer (with an empty passage) before anything is indexed.
pub struct Retriever {
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
    collection: String,
    metric: Metric,
    collection_ready: OnceCell<()>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<Embedder>,
        index: Arc<VectorIndex>,
        collection: impl Into<String>,
        metric: Metric,
    ) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
            metric,
            collection_ready: OnceCell::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    async fn ensure_collection(&self, dim: usize) -> Result<()> {
        self.collection_ready
            .get_or_try_init(|| async {
                self.index.ensure_collection(&self.collection, dim, self.metric).await.map(|_| ())
            })
            .await
            .map(|_| ())
    }

    /// Embed `question` and return the `k` nearest hits with their scores.
    pub async fn search(&self, question: &str, k: usize) -> Result<QueryResult> {
        let query = self.embedder.embed_one(question).await?;
        self.ensure_collection(query.dim()).await?;

        match self.index.search(&self.collection, &query.values, k).await {
            Ok(hits) => Ok(hits),
            Err(RagError::CollectionNotFound { .. }) => {
                // Dropped after we ensured it; recreate and report no matches.
                warn!(collection = %self.collection, "collection disappeared, recreating");
                self.index.ensure_collection(&self.collection, query.dim(), self.metric).await?;
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Return the text of the `k` passages most similar to `question`.
    ///
    /// Hits without a `text` payload become empty passages. When nothing
    /// matches, the result is a single empty passage, never an empty list.
    #[instrument(skip(self, question), fields(collection = %self.collection, k))]
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<String>> {
        let hits = self.search(question, k).await?;
        debug!(hits = hits.len(), "retrieved passages");

        let mut passages: Vec<String> =
            hits.iter().map(|hit| hit.point.text().unwrap_or_default().to_string()).collect();
        if passages.is_empty() {
            passages.push(String::new());
        }
        Ok(passages)
    }
}
