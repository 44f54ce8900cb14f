//! Configuration for the retrieval pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::Metric;
use crate::embedding::EmbeddingModelSpec;
use crate::error::{RagError, Result};

/// Configuration parameters for indexing and serving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of passages retrieved per question.
    pub top_k: usize,
    /// Vector database collection holding the passages.
    pub collection: String,
    /// Similarity metric the collection is created with.
    pub metric: Metric,
    /// Maximum points per upsert request.
    pub upsert_batch_size: usize,
    /// Maximum characters in an extracted answer.
    pub max_answer_chars: usize,
    /// Number of passages returned as sources.
    pub max_sources: usize,
    /// Deadline for a single backend call, in milliseconds.
    pub request_timeout_ms: u64,
    /// Retries for idempotent backend calls.
    pub max_retries: u32,
    /// The pinned embedding model.
    pub embedding: EmbeddingModelSpec,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 120,
            top_k: 8,
            collection: "gdpr_collection".to_string(),
            metric: Metric::Cosine,
            upsert_batch_size: 100,
            max_answer_chars: 512,
            max_sources: 3,
            request_timeout_ms: 10_000,
            max_retries: 3,
            embedding: EmbeddingModelSpec::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Deadline for a single backend call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Build a configuration from the process environment on top of the defaults.
    ///
    /// Recognised variables: `EMBED_MODEL`, `EMBED_DIMENSIONS`, `RETRIEVAL_TOPK`,
    /// `QDRANT_COLLECTION`, `CHUNK_SIZE`, `CHUNK_OVERLAP`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(model) = lookup("EMBED_MODEL") {
            builder = builder.embedding_model(model);
        }
        if let Some(dims) = lookup("EMBED_DIMENSIONS") {
            builder = builder.embedding_dimensions(parse_var("EMBED_DIMENSIONS", &dims)?);
        }
        if let Some(top_k) = lookup("RETRIEVAL_TOPK") {
            builder = builder.top_k(parse_var("RETRIEVAL_TOPK", &top_k)?);
        }
        if let Some(collection) = lookup("QDRANT_COLLECTION") {
            builder = builder.collection(collection);
        }
        if let Some(size) = lookup("CHUNK_SIZE") {
            builder = builder.chunk_size(parse_var("CHUNK_SIZE", &size)?);
        }
        if let Some(overlap) = lookup("CHUNK_OVERLAP") {
            builder = builder.chunk_overlap(parse_var("CHUNK_OVERLAP", &overlap)?);
        }
        builder.build()
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RagError::Config(format!("{key}={value:?} is not valid: {e}")))
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of passages retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Set the collection metric.
    pub fn metric(mut self, metric: Metric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Set the maximum number of points per upsert request.
    pub fn upsert_batch_size(mut self, size: usize) -> Self {
        self.config.upsert_batch_size = size;
        self
    }

    /// Set the maximum answer length in characters.
    pub fn max_answer_chars(mut self, chars: usize) -> Self {
        self.config.max_answer_chars = chars;
        self
    }

    /// Set how many passages are returned as sources.
    pub fn max_sources(mut self, sources: usize) -> Self {
        self.config.max_sources = sources;
        self
    }

    /// Set the per-call backend deadline.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the number of retries for idempotent backend calls.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Pin the embedding model name.
    pub fn embedding_model(mut self, name: impl Into<String>) -> Self {
        self.config.embedding.name = name.into();
        self
    }

    /// Pin the embedding dimension.
    pub fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.config.embedding.dimensions = dimensions;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `upsert_batch_size`, `max_sources` or the embedding dimension is zero
    /// - the collection or embedding model name is empty
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if config.upsert_batch_size == 0 {
            return Err(RagError::Config(
                "upsert_batch_size must be greater than zero".to_string(),
            ));
        }
        if config.max_sources == 0 {
            return Err(RagError::Config("max_sources must be greater than zero".to_string()));
        }
        if config.embedding.dimensions == 0 {
            return Err(RagError::Config(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        if config.collection.trim().is_empty() {
            return Err(RagError::Config("collection name must not be empty".to_string()));
        }
        if config.embedding.name.trim().is_empty() {
            return Err(RagError::Config("embedding model name must not be empty".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_match_serving_setup() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 120);
        assert_eq!(config.top_k, 8);
        assert_eq!(config.collection, "gdpr_collection");
        assert_eq!(config.upsert_batch_size, 100);
        assert_eq!(config.max_answer_chars, 512);
        assert_eq!(config.max_sources, 3);
        assert_eq!(config.embedding.name, "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(config.embedding.dimensions, 384);
        assert!(RagConfig::builder().build().is_ok());
    }

    #[test]
    fn test_builder_rejects_invalid_parameters() {
        assert!(RagConfig::builder().chunk_size(100).chunk_overlap(100).build().is_err());
        assert!(RagConfig::builder().chunk_size(0).chunk_overlap(0).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().upsert_batch_size(0).build().is_err());
        assert!(RagConfig::builder().max_sources(0).build().is_err());
        assert!(RagConfig::builder().embedding_dimensions(0).build().is_err());
        assert!(RagConfig::builder().collection("  ").build().is_err());
    }

    #[test]
    fn test_from_lookup_overlays_defaults() {
        let vars = HashMap::from([
            ("RETRIEVAL_TOPK", "5"),
            ("QDRANT_COLLECTION", "faq"),
            ("EMBED_MODEL", "intfloat/e5-small-v2"),
        ]);
        let config =
            RagConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.collection, "faq");
        assert_eq!(config.embedding.name, "intfloat/e5-small-v2");
        assert_eq!(config.chunk_size, 400);
    }

    #[test]
    fn test_from_lookup_rejects_malformed_numbers() {
        let err = RagConfig::from_lookup(|key| {
            (key == "RETRIEVAL_TOPK").then(|| "eight".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, RagError::Config(msg) if msg.contains("RETRIEVAL_TOPK")));
    }
}
