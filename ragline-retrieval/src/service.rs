//! Serving boundary consumed by the HTTP layer.
//!
//! [`RagService`] exposes `answer_question` and the lightweight `is_ready`
//! check. [`RagService::respond`] additionally folds errors into a
//! structured [`ServiceResponse`] so the transport never has to format a
//! bare error itself.

use std::error::Error as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::{ErrorKind, RagError, Result};
use crate::extractor::{Answer, AnswerExtractor};
use crate::retriever::Retriever;

/// A structured failure, safe to serialize to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Failure {
    pub error: String,
    pub kind: ErrorKind,
    /// Operation context followed by the error's source chain.
    pub trace: Vec<String>,
}

impl Failure {
    pub fn from_error(operation: &str, error: &RagError) -> Self {
        let mut trace = vec![format!("operation: {operation}"), error.to_string()];
        let mut source = error.source();
        while let Some(cause) = source {
            trace.push(cause.to_string());
            source = cause.source();
        }
        Self { error: error.to_string(), kind: error.kind(), trace }
    }
}

/// Either an answer or a structured failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServiceResponse {
    Answer(Answer),
    Failure(Failure),
}

/// The deployable Retriever + Extractor unit.
pub struct RagService {
    retriever: Arc<Retriever>,
    extractor: Arc<dyn AnswerExtractor>,
    top_k: usize,
}

impl RagService {
    pub fn new(
        retriever: Arc<Retriever>,
        extractor: Arc<dyn AnswerExtractor>,
        top_k: usize,
    ) -> Self {
        Self { retriever, extractor, top_k }
    }

    /// Answer `question` from the indexed passages.
    ///
    /// Backend errors are propagated unchanged; "no matches" is not an error.
    #[instrument(skip(self, question), fields(question_len = question.len(), top_k = self.top_k))]
    pub async fn answer_question(&self, question: &str) -> Result<Answer> {
        let passages = self.retriever.retrieve(question, self.top_k).await?;
        let answer = self.extractor.extract(&passages);
        info!(sources = answer.sources.len(), latency_ms = answer.latency_ms, "answered question");
        Ok(answer)
    }

    /// Like [`answer_question`](Self::answer_question) but never fails.
    pub async fn respond(&self, question: &str) -> ServiceResponse {
        match self.answer_question(question).await {
            Ok(answer) => ServiceResponse::Answer(answer),
            Err(e) => {
                error!(error = %e, kind = %e.kind(), "answer_question failed");
                ServiceResponse::Failure(Failure::from_error("answer_question", &e))
            }
        }
    }

    /// Whether the embedding model has finished loading. Never triggers a load.
    pub fn is_ready(&self) -> bool {
        self.retriever.embedder().is_loaded()
    }

    /// Load the embedding model now instead of on the first question.
    pub async fn warm_up(&self) -> Result<()> {
        self.retriever.embedder().load().await.map(|_| ())
    }
}
