//! # Evaluate Recall
//!
//! Builds an embedding table from a handful of passages, then measures
//! recall@k for a labeled query set and writes the metrics JSON.
//!
//! Run: `cargo run --example evaluate_recall`

use std::sync::Arc;

use ragline_eval::{Evaluator, ExactIndex, load_queries};
use ragline_retrieval::{
    Chunker, Document, Embedder, EmbeddingModelSpec, EmbeddingTable, FixedSizeChunker,
    HashingEmbedder,
};

const PASSAGES: &[&str] = &[
    "Paris is the capital of France.",
    "Lima is the capital of Peru.",
    "A breach must be notified within 72 hours.",
    "Rust guarantees memory safety without a garbage collector.",
];

const QUERIES: &str = r#"{"question": "What is the capital of France?", "answers": ["Paris"]}
{"question": "Which city is the capital of Peru?", "answers": ["Lima"]}

{"question": "How many hours to notify a breach?", "answers": ["72 hours"]}
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ragline_telemetry::init_json_logging("evaluate-recall")?;

    let workspace = tempfile::tempdir()?;
    let embedder = Arc::new(Embedder::new(
        EmbeddingModelSpec::new("hashing", 256),
        HashingEmbedder::loader(),
    ));

    // -- 1. Precompute the table ---------------------------------------------
    let chunker = FixedSizeChunker::new(400, 120)?;
    let chunks: Vec<_> = PASSAGES
        .iter()
        .enumerate()
        .flat_map(|(i, text)| chunker.chunk(&Document::new(format!("doc{i}"), *text)))
        .collect();
    let table = EmbeddingTable::from_chunks(&embedder, &chunks).await?;

    // -- 2. Evaluate -----------------------------------------------------------
    let queries_path = workspace.path().join("queries.jsonl");
    std::fs::write(&queries_path, QUERIES)?;
    let queries = load_queries(&queries_path)?;

    let index = ExactIndex::new(table)?;
    for k in [1, 2] {
        let report = Evaluator::new(embedder.clone(), k)?.evaluate(&index, &queries).await?;
        for outcome in &report.outcomes {
            println!("  k={k} {:?} -> rank {:?}", outcome.question, outcome.first_hit_rank);
        }

        let metrics_path = workspace.path().join("reports").join(format!("metrics@{k}.json"));
        report.write_metrics(&metrics_path)?;
        println!("{}", std::fs::read_to_string(&metrics_path)?);
    }

    Ok(())
}
