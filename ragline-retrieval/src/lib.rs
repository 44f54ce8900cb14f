//! # ragline-retrieval
//!
//! The retrieval half of the Ragline question-answering pipeline:
//! chunking, embedding, schema-checked vector indexing, retrieval and
//! extractive answering.
//!
//! ## Overview
//!
//! - [`FixedSizeChunker`] - overlapping fixed-size character windows
//! - [`Embedder`] - a pinned embedding model, loaded once on first use
//! - [`VectorIndex`] - collection management, batched upsert and k-NN search
//!   over any [`VectorStore`]
//! - [`Retriever`] - question → ranked passages
//! - [`TruncatingExtractor`] - ranked passages → [`Answer`]
//! - [`RagService`] - the serving boundary (`answer_question`, `is_ready`)
//! - [`RagPipeline`] - wires all of the above from one [`RagConfig`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragline_retrieval::{Document, HashingEmbedder, InMemoryVectorStore, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::from_env()?)
//!     .model_loader(HashingEmbedder::loader())
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! pipeline.ingest(&[Document::new("doc0", "The quick brown fox.")]).await?;
//! let answer = pipeline.service().answer_question("fox").await?;
//! ```
//!
//! ## Features
//!
//! | feature | adds |
//! |---------|------|
//! | `qdrant` | [`qdrant::QdrantVectorStore`] over gRPC |
//! | `openai` | [`openai::OpenAiCompatibleEmbedder`] for `/v1/embeddings` servers |

pub mod artifacts;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod hashing;
pub mod inmemory;
pub mod pipeline;
pub mod retriever;
pub mod retry;
pub mod service;
pub mod table;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chunking::{Chunker, FixedSizeChunker, chunk_text, normalize_whitespace};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, CollectionSchema, Document, EmbeddingVector, IndexedPoint, Metric, PointId, QueryResult,
    ScoredPoint,
};
pub use embedding::{Embedder, EmbeddingModelSpec, EmbeddingProvider, ModelLoader, PreloadedModel};
pub use error::{ErrorKind, RagError, Result};
pub use extractor::{Answer, AnswerExtractor, TruncatingExtractor};
pub use hashing::HashingEmbedder;
pub use inmemory::InMemoryVectorStore;
pub use pipeline::{PipelineArtifact, RagPipeline, RagPipelineBuilder};
pub use retriever::Retriever;
pub use retry::RetryPolicy;
pub use service::{Failure, RagService, ServiceResponse};
pub use table::{EmbeddingTable, TableRow};
pub use vectorstore::{EnsureOutcome, IndexReport, VectorIndex, VectorStore};

#[cfg(feature = "openai")]
pub use openai::{OpenAiCompatibleEmbedder, OpenAiLoader};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
