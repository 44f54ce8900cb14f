//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] wires one [`RagConfig`] into every component: the
//! [`Chunker`], the lazily-loaded [`Embedder`], the schema-checked
//! [`VectorIndex`] and the [`AnswerExtractor`]. Offline indexing uses
//! [`ingest`](RagPipeline::ingest); serving uses the [`RagService`] it hands
//! out.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragline_retrieval::{HashingEmbedder, InMemoryVectorStore, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .model_loader(HashingEmbedder::loader())
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! pipeline.ingest(&documents).await?;
//! let answer = pipeline.service().answer_question("What is personal data?").await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, Document};
use crate::embedding::{Embedder, EmbeddingModelSpec, ModelLoader};
use crate::error::{RagError, Result};
use crate::extractor::{AnswerExtractor, TruncatingExtractor};
use crate::retriever::Retriever;
use crate::retry::RetryPolicy;
use crate::service::RagService;
use crate::table::EmbeddingTable;
use crate::vectorstore::{IndexReport, VectorIndex, VectorStore};

/// Current version of the [`PipelineArtifact`] JSON layout.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// The serialized form of a pipeline, registered with the model registry.
///
/// It pins everything a serving process needs to rebuild the same
/// Retriever + Extractor: the configuration and the embedding model
/// identity the collection was indexed with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineArtifact {
    pub format_version: u32,
    pub embedding: EmbeddingModelSpec,
    pub config: RagConfig,
    pub created_at: DateTime<Utc>,
}

impl PipelineArtifact {
    pub fn new(config: RagConfig) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            embedding: config.embedding.clone(),
            config,
            created_at: Utc::now(),
        }
    }

    /// Write the artifact as pretty JSON and return its reference string.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| RagError::Serialization(format!("pipeline artifact: {e}")))?;
        std::fs::write(path, json).map_err(|e| RagError::io(path, e))?;
        info!(path = %path.display(), "saved pipeline artifact");
        Ok(path.display().to_string())
    }

    /// Read an artifact saved by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| RagError::io(path, e))?;
        let artifact: Self = serde_json::from_slice(&bytes)
            .map_err(|e| RagError::Serialization(format!("{}: {e}", path.display())))?;
        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(RagError::Serialization(format!(
                "{}: unsupported artifact format version {}",
                path.display(),
                artifact.format_version
            )));
        }
        if artifact.embedding != artifact.config.embedding {
            return Err(RagError::Config(format!(
                "{}: artifact embedding '{}' differs from configured '{}'",
                path.display(),
                artifact.embedding.name,
                artifact.config.embedding.name
            )));
        }
        Ok(artifact)
    }
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
    chunker: Arc<dyn Chunker>,
    extractor: Arc<dyn AnswerExtractor>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Rebuild a pipeline from a saved artifact.
    pub fn from_artifact(
        artifact: &PipelineArtifact,
        loader: Arc<dyn ModelLoader>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        Self::builder()
            .config(artifact.config.clone())
            .model_loader(loader)
            .vector_store(store)
            .build()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Chunk every document in order.
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|document| self.chunker.chunk(document)).collect()
    }

    /// Chunk and embed `documents` into a table without touching the index.
    pub async fn build_table(&self, documents: &[Document]) -> Result<EmbeddingTable> {
        let chunks = self.chunk_documents(documents);
        EmbeddingTable::from_chunks(&self.embedder, &chunks).await.map_err(|e| {
            error!(error = %e, chunks = chunks.len(), "embedding failed during ingestion");
            e
        })
    }

    /// Chunk → embed → upsert `documents` into the configured collection.
    ///
    /// Re-ingesting the same documents overwrites their points in place.
    ///
    /// # Errors
    ///
    /// [`RagError::Config`] when the documents produce no chunks; otherwise
    /// whatever embedding or indexing failed.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IndexReport> {
        let table = self.build_table(documents).await?;
        if table.is_empty() {
            return Err(RagError::Config("no chunks to ingest".to_string()));
        }
        let report =
            self.index.index_table(&self.config.collection, self.config.metric, &table).await?;
        info!(
            documents = documents.len(),
            upserted = report.upserted,
            total = report.total,
            "ingested documents"
        );
        Ok(report)
    }

    /// A Retriever over the configured collection.
    pub fn retriever(&self) -> Retriever {
        Retriever::new(
            self.embedder.clone(),
            self.index.clone(),
            self.config.collection.clone(),
            self.config.metric,
        )
    }

    /// The deployable serving unit.
    pub fn service(&self) -> RagService {
        RagService::new(Arc::new(self.retriever()), self.extractor.clone(), self.config.top_k)
    }

    /// Package this pipeline's configuration for registration.
    pub fn artifact(&self) -> PipelineArtifact {
        PipelineArtifact::new(self.config.clone())
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `vector_store` and one of `model_loader` / `embedder` are
/// required. The chunker and extractor default to the configured
/// [`FixedSizeChunker`] and [`TruncatingExtractor`].
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    loader: Option<Arc<dyn ModelLoader>>,
    embedder: Option<Arc<Embedder>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    extractor: Option<Arc<dyn AnswerExtractor>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configured embedding model through `loader`.
    pub fn model_loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Share an existing embedder, e.g. one already warmed up.
    pub fn embedder(mut self, embedder: Arc<Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn AnswerExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing or an
    /// explicit embedder disagrees with the configured model.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        let store = self
            .vector_store
            .ok_or_else(|| RagError::Config("vector_store is required".to_string()))?;

        let embedder = match (self.embedder, self.loader) {
            (Some(embedder), _) => {
                if embedder.spec() != &config.embedding {
                    return Err(RagError::Config(format!(
                        "embedder model '{}' ({} dims) differs from configured '{}' ({} dims)",
                        embedder.spec().name,
                        embedder.dimensions(),
                        config.embedding.name,
                        config.embedding.dimensions
                    )));
                }
                embedder
            }
            (None, Some(loader)) => Arc::new(
                Embedder::new(config.embedding.clone(), loader)
                    .with_timeout(config.request_timeout()),
            ),
            (None, None) => {
                return Err(RagError::Config("model_loader or embedder is required".to_string()));
            }
        };

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let extractor = self.extractor.unwrap_or_else(|| {
            Arc::new(TruncatingExtractor::new(config.max_answer_chars, config.max_sources))
        });

        let retry = RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() };
        let index = Arc::new(
            VectorIndex::new(store)
                .with_batch_size(config.upsert_batch_size)
                .with_retry(retry)
                .with_timeout(config.request_timeout()),
        );

        Ok(RagPipeline { config, embedder, index, chunker, extractor })
    }
}
