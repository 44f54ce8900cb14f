//! # Promote Pipeline
//!
//! Packages two pipeline configurations as artifacts, registers both and
//! promotes them in turn to the `prod` alias. The serving side then
//! resolves `MODEL_URI` (default `models:/rag_pipeline@prod`) and rebuilds
//! the pipeline from the resolved artifact.
//!
//! Run: `cargo run --example promote_pipeline`

use std::sync::Arc;

use ragline_registry::{InMemoryRegistry, LifecycleManager, ModelUri, Stage};
use ragline_retrieval::{
    Document, HashingEmbedder, InMemoryVectorStore, PipelineArtifact, RagConfig, RagPipeline,
};

const MODEL: &str = "rag_pipeline";

fn config(top_k: usize) -> ragline_retrieval::Result<RagConfig> {
    RagConfig::builder()
        .chunk_size(80)
        .chunk_overlap(20)
        .top_k(top_k)
        .embedding_model("hashing")
        .embedding_dimensions(128)
        .build()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ragline_telemetry::init_logging("promote-pipeline")?;

    let workspace = tempfile::tempdir()?;
    let lifecycle = LifecycleManager::new(Arc::new(InMemoryRegistry::new()));

    // -- 1. Register and promote two candidate pipelines -------------------
    for (candidate, top_k) in [(1, 8), (2, 4)] {
        let path = workspace.path().join(format!("candidate-{candidate}")).join("pipeline.json");
        let artifact_ref = PipelineArtifact::new(config(top_k)?).save(&path)?;
        let run_id = format!("run-{candidate}");
        let (version, report) = lifecycle
            .register_and_promote(MODEL, &artifact_ref, Some(run_id.as_str()), "prod")
            .await?;
        println!(
            "v{} promoted to prod (previous holder: {:?})",
            version.version, report.previous
        );
    }

    let model = lifecycle.registry().get_registered_model(MODEL).await?;
    for version in &model.versions {
        println!("  v{} stage={} aliases={:?}", version.version, version.stage, version.aliases);
    }
    assert_eq!(model.in_stage(Stage::Production).len(), 1);

    // -- 2. Resolve and serve ----------------------------------------------
    let uri = ModelUri::from_env()?;
    let serving = lifecycle.resolve(&uri).await?;
    println!("{uri} -> v{} ({})", serving.version, serving.artifact_ref);

    let artifact = PipelineArtifact::load(&serving.artifact_ref)?;
    let pipeline = RagPipeline::from_artifact(
        &artifact,
        HashingEmbedder::loader(),
        Arc::new(InMemoryVectorStore::new()),
    )?;
    pipeline
        .ingest(&[Document::new(
            "doc0",
            "Controllers keep records of processing activities under their responsibility.",
        )])
        .await?;

    let answer = pipeline.service().answer_question("Who keeps records of processing?").await?;
    println!("top_k={} answer: {}", pipeline.config().top_k, answer.answer);

    Ok(())
}
