//! Labeled query sets.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// A question and the substrings that count as a correct retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalQuery {
    pub question: String,
    pub answers: Vec<String>,
}

impl EvalQuery {
    pub fn new(
        question: impl Into<String>,
        answers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self { question: question.into(), answers: answers.into_iter().map(Into::into).collect() }
    }

    /// Whether `passage` contains any acceptable answer, ignoring case.
    pub fn is_answered_by(&self, passage: &str) -> bool {
        let passage = passage.to_lowercase();
        self.answers.iter().any(|answer| passage.contains(&answer.to_lowercase()))
    }
}

/// Read `{"question": ..., "answers": [...]}` lines. Blank lines are skipped.
pub fn load_queries(path: impl AsRef<Path>) -> Result<Vec<EvalQuery>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).map_err(|e| EvalError::Parse {
                path: path.display().to_string(),
                line: number + 1,
                message: e.to_string(),
            })
        })
        .collect()
}
