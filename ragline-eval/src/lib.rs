//! # ragline-eval
//!
//! Offline recall@k for Ragline retrieval: a labeled query set is embedded
//! with the pinned model and matched against a precomputed embedding table
//! by exact nearest-neighbour search.
//!
//! ```rust,ignore
//! use ragline_eval::{Evaluator, ExactIndex, load_queries};
//! use ragline_retrieval::EmbeddingTable;
//!
//! let index = ExactIndex::new(EmbeddingTable::load_jsonl("data/embeddings.jsonl")?)?;
//! let queries = load_queries("data/queries.jsonl")?;
//! let report = Evaluator::new(embedder, 8)?.evaluate(&index, &queries).await?;
//! report.write_metrics("reports/metrics.json")?;
//! ```

pub mod error;
pub mod evaluator;
pub mod exact;
pub mod queries;

pub use error::{EvalError, Result};
pub use evaluator::{EvalReport, Evaluator, QueryOutcome};
pub use exact::ExactIndex;
pub use queries::{EvalQuery, load_queries};
