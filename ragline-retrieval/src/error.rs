//! Error types for the `ragline-retrieval` crate.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Metric;

/// Errors that can occur while chunking, embedding, indexing or retrieving.
#[derive(Debug, Error)]
pub enum RagError {
    /// A collection exists with a different dimension or metric than requested.
    ///
    /// Existing data is never dropped to resolve this; the caller must
    /// migrate explicitly.
    #[error(
        "schema conflict on collection '{collection}': exists with dim={existing_dim} metric={existing_metric}, requested dim={requested_dim} metric={requested_metric}"
    )]
    SchemaConflict {
        /// The conflicting collection.
        collection: String,
        /// Dimension the collection was created with.
        existing_dim: usize,
        /// Metric the collection was created with.
        existing_metric: Metric,
        /// Dimension the caller asked for.
        requested_dim: usize,
        /// Metric the caller asked for.
        requested_metric: Metric,
    },

    /// An operation targeted a collection that does not exist.
    #[error("collection '{collection}' not found")]
    CollectionNotFound {
        /// The missing collection.
        collection: String,
    },

    /// The embedding model could not be loaded. Usually a configuration problem.
    #[error("failed to load embedding model '{model}': {message}")]
    EmbeddingLoad {
        /// Pinned model identity.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding model was loaded but failed to encode a batch.
    #[error("embedding model '{model}' failed to encode: {message}")]
    EmbeddingEncode {
        /// Pinned model identity.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector did not have the dimension its context requires.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Where the mismatch was detected.
        context: String,
        /// Expected dimension.
        expected: usize,
        /// Observed dimension.
        actual: usize,
    },

    /// Network or availability failure talking to the vector database.
    #[error("vector backend error ({backend}) during {operation} on '{collection}': {message}")]
    VectorBackend {
        /// The vector store backend that produced the error.
        backend: String,
        /// The operation in flight (`search`, `upsert`, ...).
        operation: String,
        /// The collection involved.
        collection: String,
        /// A description of the failure.
        message: String,
    },

    /// A backend call exceeded its deadline.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// Invalid chunking parameters.
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing an artifact failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The path involved.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An artifact or table could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Stable, serializable classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaConflict,
    CollectionNotFound,
    EmbeddingBackend,
    DimensionMismatch,
    VectorBackend,
    Timeout,
    InvalidInput,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SchemaConflict => "schema_conflict",
            Self::CollectionNotFound => "collection_not_found",
            Self::EmbeddingBackend => "embedding_backend",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::VectorBackend => "vector_backend",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid_input",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

impl RagError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaConflict { .. } => ErrorKind::SchemaConflict,
            Self::CollectionNotFound { .. } => ErrorKind::CollectionNotFound,
            Self::EmbeddingLoad { .. } | Self::EmbeddingEncode { .. } => {
                ErrorKind::EmbeddingBackend
            }
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::VectorBackend { .. } => ErrorKind::VectorBackend,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Chunking(_) | Self::Config(_) | Self::Serialization(_) => ErrorKind::InvalidInput,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Whether retrying an idempotent operation that failed with this error may succeed.
    ///
    /// Load failures, schema problems and invalid input are permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingEncode { .. } | Self::VectorBackend { .. } | Self::Timeout { .. }
        )
    }

    pub(crate) fn vector_backend(
        backend: &str,
        operation: &str,
        collection: &str,
        message: impl fmt::Display,
    ) -> Self {
        Self::VectorBackend {
            backend: backend.to_string(),
            operation: operation.to_string(),
            collection: collection.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().display().to_string(), source }
    }
}
