//! Error types for the `ragline-eval` crate.

use ragline_retrieval::RagError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    /// recall@k is undefined without queries.
    #[error("query set is empty")]
    EmptyQuerySet,

    #[error("k must be greater than zero")]
    InvalidK,

    /// Embedding or table validation failed.
    #[error(transparent)]
    Retrieval(#[from] RagError),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse { path: String, line: usize, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;

impl EvalError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io { path: path.display().to_string(), source }
    }
}
