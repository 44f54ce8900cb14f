//! Deterministic, offline embedding backend.
//!
//! [`HashingEmbedder`] projects lowercase word tokens and their bigrams into a
//! fixed number of signed buckets (the "hashing trick"). Texts that share
//! words get similar vectors, which is enough for offline indexing runs,
//! evaluation smoke tests and unit tests without a model server.

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::{EmbeddingModelSpec, EmbeddingProvider, ModelLoader};
use crate::error::Result;

/// FNV-1a, stable across platforms and releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Feature-hashing embedder over word unigrams and bigrams.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    /// A [`ModelLoader`] that builds a `HashingEmbedder` sized by the model spec.
    pub fn loader() -> Arc<dyn ModelLoader> {
        Arc::new(HashingLoader)
    }

    fn add_feature(&self, values: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        values[bucket] += sign * weight;
    }

    /// Compute the (unnormalized) feature vector for `text`.
    pub fn features(&self, text: &str) -> Vec<f32> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut values = vec![0.0f32; self.dimensions];
        if tokens.is_empty() {
            // Keep the vector non-zero so it can be normalized.
            self.add_feature(&mut values, text, 1.0);
            return values;
        }
        for token in &tokens {
            self.add_feature(&mut values, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut values, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        if values.iter().all(|v| *v == 0.0) {
            self.add_feature(&mut values, text, 1.0);
        }
        values
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.features(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

struct HashingLoader;

#[async_trait]
impl ModelLoader for HashingLoader {
    async fn load(&self, spec: &EmbeddingModelSpec) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(HashingEmbedder::new(spec.dimensions)))
    }
}
