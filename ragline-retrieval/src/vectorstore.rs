//! Vector store backends and the schema-checked [`VectorIndex`] on top of them.
//!
//! A [`VectorStore`] exposes the primitive operations of one vector database.
//! [`VectorIndex`] adds the collection contract used by the rest of the
//! crate: creation only on confirmed absence, schema checks on every
//! `ensure_collection`, dimension checks before writes, bounded upsert
//! batches with per-batch retry, and per-call deadlines.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::document::{CollectionSchema, IndexedPoint, Metric, QueryResult};
use crate::error::{RagError, Result};
use crate::retry::{RetryPolicy, with_timeout};
use crate::table::EmbeddingTable;

/// A storage backend for vector embeddings with similarity search.
///
/// # Example
///
/// ```rust,ignore
/// use ragline_retrieval::{VectorStore, InMemoryVectorStore, CollectionSchema, Metric};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection(&CollectionSchema::new("docs", 384, Metric::Cosine)).await?;
/// store.upsert("docs", &points).await?;
/// let hits = store.search("docs", &query, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in errors and logs.
    fn backend(&self) -> &'static str;

    /// Look up a collection's schema.
    ///
    /// Returns `Ok(None)` only when the backend confirms the collection is
    /// absent. Failing to reach the backend is an error, never `None`.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionSchema>>;

    /// Create a collection. Fails if it already exists.
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;

    /// Delete a collection and all its points.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or replace points by id.
    async fn upsert(&self, collection: &str, points: &[IndexedPoint]) -> Result<()>;

    /// Return up to `limit` points ordered by descending similarity.
    ///
    /// Fails with [`RagError::CollectionNotFound`] if the collection is absent.
    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<QueryResult>;

    /// Number of points in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Whether [`VectorIndex::ensure_collection`] created the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureOutcome {
    Created,
    Existing,
}

/// Summary of a bulk load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub collection: String,
    pub dim: usize,
    /// Points sent in this run.
    pub upserted: usize,
    /// Points in the collection afterwards.
    pub total: usize,
    pub outcome: EnsureOutcome,
}

/// Default maximum number of points per upsert request.
pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 100;

/// Schema-checked collection management over a [`VectorStore`].
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    retry: RetryPolicy,
    timeout: Duration,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_UPSERT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the maximum number of points per upsert request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the retry policy for idempotent calls (search and upsert-by-id).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the deadline for each backend call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Look up a collection's schema; `None` means confirmed absent.
    pub async fn collection_info(&self, name: &str) -> Result<Option<CollectionSchema>> {
        self.retry
            .run("collection_info", || {
                with_timeout("collection_info", self.timeout, self.store.collection_info(name))
            })
            .await
    }

    /// Make sure `name` exists with `dim` and `metric`.
    ///
    /// Creates the collection only when the backend confirms it is absent.
    /// An existing collection with a different dimension or metric is a
    /// [`RagError::SchemaConflict`]; it is never recreated.
    pub async fn ensure_collection(
        &self,
        name: &str,
        dim: usize,
        metric: Metric,
    ) -> Result<EnsureOutcome> {
        if dim == 0 {
            return Err(RagError::Config(format!(
                "collection '{name}' needs a dimension greater than zero"
            )));
        }

        match self.collection_info(name).await? {
            Some(existing) if existing.dim == dim && existing.metric == metric => {
                debug!(collection = name, dim, %metric, "collection already exists");
                Ok(EnsureOutcome::Existing)
            }
            Some(existing) => {
                error!(
                    collection = name,
                    existing_dim = existing.dim,
                    requested_dim = dim,
                    "collection schema conflict"
                );
                Err(RagError::SchemaConflict {
                    collection: name.to_string(),
                    existing_dim: existing.dim,
                    existing_metric: existing.metric,
                    requested_dim: dim,
                    requested_metric: metric,
                })
            }
            None => {
                let schema = CollectionSchema::new(name, dim, metric);
                let created = with_timeout(
                    "create_collection",
                    self.timeout,
                    self.store.create_collection(&schema),
                )
                .await;
                if let Err(e) = created {
                    // Another writer may have created it between the lookup and our create.
                    return match self.collection_info(name).await {
                        Ok(Some(existing)) if existing.dim == dim && existing.metric == metric => {
                            Ok(EnsureOutcome::Existing)
                        }
                        _ => Err(e),
                    };
                }
                info!(
                    collection = name,
                    dim,
                    %metric,
                    backend = self.store.backend(),
                    "created collection"
                );
                Ok(EnsureOutcome::Created)
            }
        }
    }

    /// Insert or replace `points` in bounded batches.
    ///
    /// Every point must match the collection's dimension. Each batch is
    /// retried independently; upserts are idempotent by point id, so a batch
    /// that is replayed after a partial failure converges to the same state.
    pub async fn upsert(&self, collection: &str, points: &[IndexedPoint]) -> Result<usize> {
        let schema = self
            .collection_info(collection)
            .await?
            .ok_or_else(|| RagError::CollectionNotFound { collection: collection.to_string() })?;

        if let Some(bad) = points.iter().find(|p| p.vector.dim() != schema.dim) {
            return Err(RagError::DimensionMismatch {
                context: format!("upsert of point {} into '{collection}'", bad.id),
                expected: schema.dim,
                actual: bad.vector.dim(),
            });
        }

        for (batch_number, batch) in points.chunks(self.batch_size).enumerate() {
            self.retry
                .run("upsert", || {
                    with_timeout("upsert", self.timeout, self.store.upsert(collection, batch))
                })
                .await
                .map_err(|e| {
                    error!(collection, batch = batch_number, error = %e, "upsert batch failed");
                    e
                })?;
            debug!(collection, batch = batch_number, points = batch.len(), "upserted batch");
        }
        Ok(points.len())
    }

    /// Return up to `k` nearest neighbours of `vector`, most similar first.
    ///
    /// Fails with [`RagError::CollectionNotFound`] if the collection is absent
    /// and with [`RagError::DimensionMismatch`] if `vector` does not match
    /// the collection's dimension. Neither reaches the backend's search.
    pub async fn search(&self, collection: &str, vector: &[f32], k: usize) -> Result<QueryResult> {
        if k == 0 {
            return Err(RagError::Config("search limit must be greater than zero".to_string()));
        }
        let schema = self
            .collection_info(collection)
            .await?
            .ok_or_else(|| RagError::CollectionNotFound { collection: collection.to_string() })?;
        if vector.len() != schema.dim {
            return Err(RagError::DimensionMismatch {
                context: format!("search of '{collection}'"),
                expected: schema.dim,
                actual: vector.len(),
            });
        }

        let hits = self
            .retry
            .run("search", || {
                with_timeout("search", self.timeout, self.store.search(collection, vector, k))
            })
            .await?;
        debug!(collection, k, hits = hits.len(), "search completed");
        Ok(hits)
    }

    /// Number of points in a collection.
    pub async fn count(&self, collection: &str) -> Result<usize> {
        self.retry
            .run("count", || with_timeout("count", self.timeout, self.store.count(collection)))
            .await
    }

    /// Delete a collection and all its points.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        with_timeout("delete_collection", self.timeout, self.store.delete_collection(name)).await?;
        info!(collection = name, "deleted collection");
        Ok(())
    }

    /// Bulk-load an embedding table into `collection`.
    ///
    /// The dimension is taken from the table, the collection is ensured with
    /// it, and rows are upserted under their stable ids.
    pub async fn index_table(
        &self,
        collection: &str,
        metric: Metric,
        table: &EmbeddingTable,
    ) -> Result<IndexReport> {
        let dim = table.dim()?;
        let points = table.to_points()?;
        let outcome = self.ensure_collection(collection, dim, metric).await?;
        let upserted = self.upsert(collection, &points).await?;
        let total = self.count(collection).await?;
        info!(collection, dim, upserted, total, "indexed embedding table");
        Ok(IndexReport { collection: collection.to_string(), dim, upserted, total, outcome })
    }
}
