//! Embedding providers and the lazily-loaded [`Embedder`].
//!
//! An [`EmbeddingProvider`] is a loaded model that maps text to raw vectors.
//! A [`ModelLoader`] knows how to produce one from a pinned
//! [`EmbeddingModelSpec`]. The [`Embedder`] owns the single-initialization
//! cell that holds the loaded model for the life of the process: the first
//! caller performs the load, concurrent callers wait for it and share the
//! result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::document::EmbeddingVector;
use crate::error::{RagError, Result};

/// Identity of the pinned embedding model.
///
/// Changing either field without re-indexing invalidates existing collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingModelSpec {
    /// Model name, e.g. `sentence-transformers/all-MiniLM-L6-v2`.
    pub name: String,
    /// Output dimension of the model.
    pub dimensions: usize,
}

impl Default for EmbeddingModelSpec {
    fn default() -> Self {
        Self { name: "sentence-transformers/all-MiniLM-L6-v2".to_string(), dimensions: 384 }
    }
}

impl EmbeddingModelSpec {
    pub fn new(name: impl Into<String>, dimensions: usize) -> Self {
        Self { name: name.into(), dimensions }
    }
}

/// A loaded model that generates vector embeddings from text input.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Produces a loaded [`EmbeddingProvider`] for a model spec.
///
/// Loading is assumed to be expensive; the [`Embedder`] calls it at most once
/// per successful load.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, spec: &EmbeddingModelSpec) -> Result<Arc<dyn EmbeddingProvider>>;
}

/// A loader that hands out an already constructed provider.
pub struct PreloadedModel {
    provider: Arc<dyn EmbeddingProvider>,
}

impl PreloadedModel {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ModelLoader for PreloadedModel {
    async fn load(&self, _spec: &EmbeddingModelSpec) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(self.provider.clone())
    }
}

/// Default number of texts sent to the model per call.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// Maps text to unit-norm vectors with a pinned, lazily-loaded model.
///
/// # Example
///
/// ```rust,ignore
/// use ragline_retrieval::{Embedder, EmbeddingModelSpec, HashingEmbedder};
///
/// let spec = EmbeddingModelSpec::new("hashing", 256);
/// let embedder = Embedder::new(spec, HashingEmbedder::loader());
/// assert!(!embedder.is_loaded());
/// let vectors = embedder.embed(&["hello world"]).await?;
/// assert!(embedder.is_loaded());
/// ```
pub struct Embedder {
    spec: EmbeddingModelSpec,
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn EmbeddingProvider>>,
    batch_size: usize,
    timeout: Option<Duration>,
}

impl Embedder {
    /// Create an embedder. Nothing is loaded until the first embed call.
    pub fn new(spec: EmbeddingModelSpec, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            spec,
            loader,
            model: OnceCell::new(),
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            timeout: None,
        }
    }

    /// Set how many texts are sent to the model per call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Bound every encode call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The pinned model identity.
    pub fn spec(&self) -> &EmbeddingModelSpec {
        &self.spec
    }

    /// Output dimension of the pinned model.
    pub fn dimensions(&self) -> usize {
        self.spec.dimensions
    }

    /// Whether the model has been loaded. Never triggers a load.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Load the model if needed.
    ///
    /// Concurrent first calls share a single load. A failed load leaves the
    /// cell empty so a later call can try again.
    pub async fn load(&self) -> Result<&Arc<dyn EmbeddingProvider>> {
        self.model
            .get_or_try_init(|| async {
                info!(model = %self.spec.name, "loading embedding model");
                let provider = self.loader.load(&self.spec).await.map_err(|e| {
                    error!(model = %self.spec.name, error = %e, "embedding model load failed");
                    match e {
                        RagError::EmbeddingLoad { .. } => e,
                        other => RagError::EmbeddingLoad {
                            model: self.spec.name.clone(),
                            message: other.to_string(),
                        },
                    }
                })?;
                if provider.dimensions() != self.spec.dimensions {
                    return Err(RagError::DimensionMismatch {
                        context: format!("embedding model '{}'", self.spec.name),
                        expected: self.spec.dimensions,
                        actual: provider.dimensions(),
                    });
                }
                info!(
                    model = %self.spec.name,
                    dimensions = self.spec.dimensions,
                    "embedding model loaded"
                );
                Ok(provider)
            })
            .await
    }

    /// Embed `texts` in batches, returning one unit-norm vector per input.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmbeddingLoad`] if the model cannot be loaded
    /// - [`RagError::EmbeddingEncode`] if a batch fails or yields a zero vector
    /// - [`RagError::DimensionMismatch`] if the model returns vectors of the wrong size
    /// - [`RagError::Timeout`] if a batch exceeds the configured deadline
    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.load().await?;

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(model = %self.spec.name, batch_size = batch.len(), "embedding batch");
            let raw = self.encode(model.as_ref(), batch).await?;
            if raw.len() != batch.len() {
                return Err(self.encode_error(format!(
                    "model returned {} vectors for {} inputs",
                    raw.len(),
                    batch.len()
                )));
            }
            for values in raw {
                if values.len() != self.spec.dimensions {
                    return Err(RagError::DimensionMismatch {
                        context: format!("embedding model '{}'", self.spec.name),
                        expected: self.spec.dimensions,
                        actual: values.len(),
                    });
                }
                let vector = EmbeddingVector::normalize(values)
                    .ok_or_else(|| self.encode_error("model returned a zero-norm vector"))?;
                vectors.push(vector);
            }
        }
        Ok(vectors)
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<EmbeddingVector> {
        self.embed(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.encode_error("model returned no vector"))
    }

    async fn encode(
        &self,
        model: &dyn EmbeddingProvider,
        batch: &[&str],
    ) -> Result<Vec<Vec<f32>>> {
        let call = model.embed_batch(batch);
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call).await.map_err(|_| {
                RagError::Timeout {
                    operation: format!("embed with '{}'", self.spec.name),
                    timeout_ms: timeout.as_millis() as u64,
                }
            })?,
            None => call.await,
        };
        result.map_err(|e| match e {
            RagError::EmbeddingEncode { .. } | RagError::Timeout { .. } => e,
            other => self.encode_error(other.to_string()),
        })
    }

    fn encode_error(&self, message: impl Into<String>) -> RagError {
        RagError::EmbeddingEncode { model: self.spec.name.clone(), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::hashing::HashingEmbedder;

    struct CountingLoader {
        loads: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load(&self, spec: &EmbeddingModelSpec) -> Result<Arc<dyn EmbeddingProvider>> {
            let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && attempt == 0 {
                return Err(RagError::Config("weights missing".into()));
            }
            Ok(Arc::new(HashingEmbedder::new(spec.dimensions)))
        }
    }

    struct WrongDims;

    #[async_trait]
    impl EmbeddingProvider for WrongDims {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; 3])
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_load_once() {
        let loader = Arc::new(CountingLoader { loads: AtomicUsize::new(0), fail_first: false });
        let embedder = Arc::new(Embedder::new(EmbeddingModelSpec::new("hash", 32), loader.clone()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let embedder = embedder.clone();
                tokio::spawn(async move { embedder.embed_one(&format!("query {i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(embedder.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_reported_and_retried() {
        let loader = Arc::new(CountingLoader { loads: AtomicUsize::new(0), fail_first: true });
        let embedder = Embedder::new(EmbeddingModelSpec::new("hash", 16), loader.clone());

        let err = embedder.embed_one("hello").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingLoad { ref model, .. } if model == "hash"));
        assert!(!embedder.is_loaded());

        embedder.embed_one("hello").await.unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_is_loaded_does_not_force_load() {
        let embedder =
            Embedder::new(EmbeddingModelSpec::new("hash", 16), HashingEmbedder::loader());
        assert!(!embedder.is_loaded());
        assert!(!embedder.is_loaded());
        embedder.load().await.unwrap();
        assert!(embedder.is_loaded());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_between_spec_and_model() {
        let embedder = Embedder::new(
            EmbeddingModelSpec::new("wrong", 4),
            Arc::new(PreloadedModel::new(Arc::new(WrongDims))),
        );
        let err = embedder.embed_one("x").await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 4, actual: 8, .. }));
    }

    #[tokio::test]
    async fn test_vector_of_wrong_length_is_rejected() {
        let embedder = Embedder::new(
            EmbeddingModelSpec::new("wrong", 8),
            Arc::new(PreloadedModel::new(Arc::new(WrongDims))),
        );
        let err = embedder.embed_one("x").await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 8, actual: 3, .. }));
    }

    #[tokio::test]
    async fn test_batches_preserve_input_order() {
        let embedder = Embedder::new(EmbeddingModelSpec::new("hash", 64), HashingEmbedder::loader())
            .with_batch_size(2);
        let texts = ["alpha", "beta", "gamma", "delta", "epsilon"];
        let batched = embedder.embed(&texts).await.unwrap();
        assert_eq!(batched.len(), texts.len());
        for (text, vector) in texts.iter().zip(&batched) {
            assert_eq!(&embedder.embed_one(text).await.unwrap(), vector);
        }
    }
}
