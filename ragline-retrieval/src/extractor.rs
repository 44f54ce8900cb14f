//! Ranked passages → answer payload.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The response returned to the serving layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
    /// Wall-clock cost of the extraction step only.
    pub latency_ms: u64,
}

/// Turns ranked passages into an [`Answer`].
///
/// This is where a generative answer step would plug in; the shipped
/// implementation is extractive.
pub trait AnswerExtractor: Send + Sync {
    fn extract(&self, passages: &[String]) -> Answer;
}

/// Answers with the top passage cut to a maximum length.
///
/// `sources` holds the first `max_sources` passages verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncatingExtractor {
    max_answer_chars: usize,
    max_sources: usize,
}

impl Default for TruncatingExtractor {
    fn default() -> Self {
        Self { max_answer_chars: 512, max_sources: 3 }
    }
}

impl TruncatingExtractor {
    pub fn new(max_answer_chars: usize, max_sources: usize) -> Self {
        Self { max_answer_chars, max_sources }
    }
}

impl AnswerExtractor for TruncatingExtractor {
    fn extract(&self, passages: &[String]) -> Answer {
        let start = Instant::now();
        let answer = passages
            .first()
            .map(|top| top.chars().take(self.max_answer_chars).collect())
            .unwrap_or_default();
        let sources = passages.iter().take(self.max_sources).cloned().collect();
        let latency_ms = start.elapsed().as_millis() as u64;
        Answer { answer, sources, latency_ms }
    }
}
