//! # Ingest and Query
//!
//! Writes a small markdown corpus, chunks it into `doc{N}_chunk{M}.txt`
//! files, indexes the chunks and answers a few questions through the
//! serving boundary.
//!
//! Uses the offline `HashingEmbedder` and `InMemoryVectorStore`, so it runs
//! with no model server or vector database.
//!
//! Run: `cargo run --example ingest_and_query`

use std::sync::Arc;

use ragline_retrieval::artifacts::{load_chunk_files, load_documents, write_chunk_files};
use ragline_retrieval::{
    EmbeddingTable, FixedSizeChunker, HashingEmbedder, InMemoryVectorStore, RagConfig, RagPipeline,
};

const CORPUS: &[(&str, &str)] = &[
    (
        "consent.md",
        "Consent must be freely given, specific, informed and unambiguous. \
         The data subject can withdraw consent at any time.",
    ),
    (
        "erasure.md",
        "The right to erasure lets a person ask a controller to delete personal data \
         without undue delay when it is no longer necessary.",
    ),
    (
        "breach.md",
        "A personal data breach must be notified to the supervisory authority \
         within 72 hours after the controller becomes aware of it.",
    ),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ragline_telemetry::init_logging("ingest-and-query")?;

    let workspace = tempfile::tempdir()?;
    let docs_dir = workspace.path().join("docs");
    let chunks_dir = workspace.path().join("chunks");
    std::fs::create_dir_all(&docs_dir)?;
    for (name, text) in CORPUS {
        std::fs::write(docs_dir.join(name), text)?;
    }

    // -- 1. Configure ------------------------------------------------------
    let config = RagConfig::builder()
        .chunk_size(120)
        .chunk_overlap(30)
        .top_k(3)
        .collection("demo_collection")
        .embedding_model("hashing")
        .embedding_dimensions(256)
        .build()?;

    let pipeline = RagPipeline::builder()
        .config(config.clone())
        .model_loader(HashingEmbedder::loader())
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .build()?;

    // -- 2. Chunk to files, then embed the chunk directory -----------------
    let documents = load_documents(&docs_dir)?;
    let chunker = FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?;
    write_chunk_files(&chunks_dir, &documents, &chunker)?;
    let chunks = load_chunk_files(&chunks_dir)?;
    println!("{} documents -> {} chunk files", documents.len(), chunks.len());

    let table = EmbeddingTable::from_chunks(pipeline.embedder(), &chunks).await?;
    let table_path = workspace.path().join("embeddings.jsonl");
    table.save_jsonl(&table_path)?;

    // -- 3. Bulk-load the table --------------------------------------------
    let table = EmbeddingTable::load_jsonl(&table_path)?;
    let report = pipeline.index().index_table(&config.collection, config.metric, &table).await?;
    println!("indexed {} points into '{}' (dim {})", report.total, report.collection, report.dim);

    // -- 4. Serve ----------------------------------------------------------
    let service = pipeline.service();
    for question in [
        "How quickly must a breach be notified?",
        "Can consent be withdrawn?",
        "When can personal data be erased?",
    ] {
        let response = service.respond(question).await;
        println!("\nQ: {question}\n{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}
