//! In-memory vector store.
//!
//! This module provides [`InMemoryVectorStore`], a dependency-free vector
//! store backed by a `BTreeMap` protected by a `tokio::sync::RwLock`. It is
//! suitable for development, testing, evaluation and small corpora.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{CollectionSchema, IndexedPoint, PointId, QueryResult, ScoredPoint};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

#[derive(Debug)]
struct Collection {
    schema: CollectionSchema,
    points: BTreeMap<PointId, IndexedPoint>,
}

/// An in-memory vector store using exact (brute-force) similarity search.
///
/// Collections are stored as nested maps: collection name → point id → point.
/// Points iterate in id order, so equal scores come back in a stable order.
///
/// # Example
///
/// ```rust,ignore
/// use ragline_retrieval::{InMemoryVectorStore, VectorStore, CollectionSchema, Metric};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection(&CollectionSchema::new("docs", 384, Metric::Cosine)).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(collection: &str) -> RagError {
    RagError::CollectionNotFound { collection: collection.to_string() }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &'static str {
        "in-memory"
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionSchema>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.schema.clone()))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(&schema.name) {
            return Err(RagError::vector_backend(
                self.backend(),
                "create_collection",
                &schema.name,
                "collection already exists",
            ));
        }
        let collection = Collection { schema: schema.clone(), points: BTreeMap::new() };
        collections.insert(schema.name.clone(), collection);
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[IndexedPoint]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| not_found(collection))?;
        if let Some(bad) = points.iter().find(|p| p.vector.dim() != store.schema.dim) {
            return Err(RagError::DimensionMismatch {
                context: format!("upsert of point {} into '{collection}'", bad.id),
                expected: store.schema.dim,
                actual: bad.vector.dim(),
            });
        }
        for point in points {
            store.points.insert(point.id.clone(), point.clone());
        }
        Ok(())
    }

    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<QueryResult> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| not_found(collection))?;
        if vector.len() != store.schema.dim {
            return Err(RagError::DimensionMismatch {
                context: format!("search in '{collection}'"),
                expected: store.schema.dim,
                actual: vector.len(),
            });
        }

        let metric = store.schema.metric;
        let mut scored: Vec<ScoredPoint> = store
            .points
            .values()
            .map(|point| ScoredPoint {
                score: metric.score(&point.vector.values, vector),
                point: point.clone(),
            })
            .collect();

        // Stable sort keeps id order among equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| not_found(collection))?;
        Ok(store.points.len())
    }
}
