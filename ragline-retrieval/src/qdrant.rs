//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//! Only available with the `qdrant` feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragline_retrieval::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::from_env()?;
//! let index = VectorIndex::new(Arc::new(store));
//! index.ensure_collection("gdpr_collection", 384, Metric::Cosine).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointId as QdrantPointId, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::{Map, Value};
use tracing::debug;

use crate::document::{
    CollectionSchema, EmbeddingVector, IndexedPoint, Metric, PointId, QueryResult, ScoredPoint,
};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "qdrant";

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Payloads are stored as-is; `text` holds the passage. Search results do
/// not carry vectors back, so returned points have empty vector values.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Connect to the given gRPC URL.
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let mut builder = Qdrant::from_url(url).timeout(timeout);
        if let Some(api_key) = api_key {
            builder = builder.api_key(api_key);
        }
        let client = builder.build().map_err(|e| map_err(e, "connect", url))?;
        Ok(Self { client })
    }

    /// Connect using `QDRANT_URL` (default `http://localhost:6334`) and `QDRANT_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".into());
        let api_key = std::env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty());
        Self::new(&url, api_key, Duration::from_secs(10))
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }
}

fn map_err(e: QdrantError, operation: &str, collection: &str) -> RagError {
    RagError::vector_backend(BACKEND, operation, collection, e)
}

fn to_distance(metric: Metric) -> Distance {
    match metric {
        Metric::Cosine => Distance::Cosine,
        Metric::Dot => Distance::Dot,
        Metric::Euclid => Distance::Euclid,
    }
}

fn from_distance(distance: i32) -> Option<Metric> {
    match Distance::try_from(distance).ok()? {
        Distance::Cosine => Some(Metric::Cosine),
        Distance::Dot => Some(Metric::Dot),
        Distance::Euclid => Some(Metric::Euclid),
        _ => None,
    }
}

fn to_point_id(id: &PointId) -> QdrantPointId {
    match id {
        PointId::Num(n) => QdrantPointId::from(*n),
        PointId::Uuid(s) => QdrantPointId::from(s.clone()),
    }
}

fn from_point_id(id: Option<&QdrantPointId>) -> PointId {
    match id.and_then(|pid| pid.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(n)) => PointId::Num(*n),
        Some(PointIdOptions::Uuid(s)) => PointId::Uuid(s.clone()),
        None => PointId::Uuid(String::new()),
    }
}

/// Convert a Qdrant payload value into JSON.
fn to_json(value: &QdrantValue) -> Value {
    match &value.kind {
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => Value::from(*i),
        Some(Kind::DoubleValue(d)) => Value::from(*d),
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::StructValue(s)) => {
            Value::Object(s.fields.iter().map(|(k, v)| (k.clone(), to_json(v))).collect())
        }
        Some(Kind::ListValue(l)) => Value::Array(l.values.iter().map(to_json).collect()),
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionSchema>> {
        // An explicit existence check, so "unreachable" never reads as "absent".
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| map_err(e, "collection_exists", name))?;
        if !exists {
            return Ok(None);
        }

        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| map_err(e, "collection_info", name))?;
        let params = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        match params {
            Some(Config::Params(params)) => {
                let metric = from_distance(params.distance).ok_or_else(|| {
                    RagError::vector_backend(
                        BACKEND,
                        "collection_info",
                        name,
                        format!("unsupported distance {}", params.distance),
                    )
                })?;
                Ok(Some(CollectionSchema::new(name, params.size as usize, metric)))
            }
            _ => Err(RagError::vector_backend(
                BACKEND,
                "collection_info",
                name,
                "collection does not have a single unnamed vector configuration",
            )),
        }
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&schema.name).vectors_config(VectorParamsBuilder::new(
                    schema.dim as u64,
                    to_distance(schema.metric),
                )),
            )
            .await
            .map_err(|e| map_err(e, "create_collection", &schema.name))?;

        debug!(collection = %schema.name, dim = schema.dim, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| map_err(e, "delete_collection", name))?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[IndexedPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let points = points
            .iter()
            .map(|point| {
                let payload = Payload::try_from(Value::Object(point.payload.clone()))
                    .map_err(|e| RagError::Serialization(format!("payload of {}: {e}", point.id)))?;
                Ok(PointStruct::new(to_point_id(&point.id), point.vector.values.clone(), payload))
            })
            .collect::<Result<Vec<_>>>()?;
        let count = points.len();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| map_err(e, "upsert", collection))?;

        debug!(collection, count, "upserted points to qdrant");
        Ok(())
    }

    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<QueryResult> {
        let response = match self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // Distinguish a missing collection from an unreachable backend.
                if let Ok(false) = self.client.collection_exists(collection).await {
                    return Err(RagError::CollectionNotFound { collection: collection.to_string() });
                }
                return Err(map_err(e, "search", collection));
            }
        };

        let results = response
            .result
            .into_iter()
            .map(|scored| {
                let payload: Map<String, Value> =
                    scored.payload.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
                ScoredPoint {
                    point: IndexedPoint {
                        id: from_point_id(scored.id.as_ref()),
                        vector: EmbeddingVector { values: Vec::new(), normalized: false },
                        payload,
                    },
                    score: scored.score,
                }
            })
            .collect();

        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(|e| map_err(e, "count", collection))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}
