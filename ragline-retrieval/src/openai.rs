//! Embedding backend for OpenAI-compatible `/v1/embeddings` endpoints.
//!
//! This module is only available when the `openai` feature is enabled. The
//! base URL is configurable, so self-hosted servers that expose the same API
//! (text-embeddings-inference, vLLM, LocalAI, ...) can serve the pinned model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::embedding::{EmbeddingModelSpec, EmbeddingProvider, ModelLoader};
use crate::error::{RagError, Result};

/// The default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// # Example
///
/// ```rust,ignore
/// use ragline_retrieval::openai::OpenAiCompatibleEmbedder;
///
/// let provider =
///     OpenAiCompatibleEmbedder::new("http://localhost:8080/v1", "all-MiniLM-L6-v2", 384)?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAiCompatibleEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl OpenAiCompatibleEmbedder {
    /// Create a provider for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self> {
        Self::with_timeout(base_url, model, dimensions, Duration::from_secs(30))
    }

    /// Like [`new`](Self::new) with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let model = model.into();
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            RagError::EmbeddingLoad { model: model.clone(), message: format!("http client: {e}") }
        })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model,
            dimensions,
        })
    }

    /// Send `api_key` as a bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.is_empty()).then_some(api_key);
        self
    }

    fn encode_error(&self, message: String) -> RagError {
        RagError::EmbeddingEncode { model: self.model.clone(), message }
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| self.encode_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body = EmbeddingRequest { model: &self.model, input: texts.to_vec() };
        let mut request =
            self.client.post(format!("{}/embeddings", self.base_url)).json(&request_body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(model = %self.model, error = %e, "request failed");
            self.encode_error(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(model = %self.model, %status, "API error");
            return Err(self.encode_error(format!("API returned {status}: {detail}")));
        }

        let mut embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(model = %self.model, error = %e, "failed to parse response");
            self.encode_error(format!("failed to parse response: {e}"))
        })?;

        embedding_response.data.sort_by_key(|d| d.index);
        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Loads an [`OpenAiCompatibleEmbedder`] for the pinned model and verifies it.
///
/// The load issues one test request so that a wrong URL, an unknown model or
/// a dimension change surfaces as a load failure instead of on the first query.
pub struct OpenAiLoader {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiLoader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), api_key: None, timeout: Duration::from_secs(30) }
    }

    /// Target the OpenAI API using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| RagError::Config(
            "OPENAI_API_KEY environment variable not set".into(),
        ))?;
        Ok(Self::new(OPENAI_BASE_URL).with_api_key(api_key))
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ModelLoader for OpenAiLoader {
    async fn load(&self, spec: &EmbeddingModelSpec) -> Result<Arc<dyn EmbeddingProvider>> {
        let mut provider = OpenAiCompatibleEmbedder::with_timeout(
            &self.base_url,
            &spec.name,
            spec.dimensions,
            self.timeout,
        )?;
        if let Some(api_key) = &self.api_key {
            provider = provider.with_api_key(api_key.clone());
        }

        let sample = provider.embed("ping").await.map_err(|e| RagError::EmbeddingLoad {
            model: spec.name.clone(),
            message: format!("test request failed: {e}"),
        })?;
        if sample.len() != spec.dimensions {
            return Err(RagError::DimensionMismatch {
                context: format!("embedding model '{}'", spec.name),
                expected: spec.dimensions,
                actual: sample.len(),
            });
        }

        info!(model = %spec.name, base_url = %self.base_url, "embedding endpoint verified");
        Ok(Arc::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let provider = OpenAiCompatibleEmbedder::new("http://localhost:8080/v1/", "m", 4).unwrap();
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
        assert_eq!(provider.dimensions(), 4);
    }

    #[test]
    fn test_empty_api_key_is_not_sent() {
        let provider = OpenAiCompatibleEmbedder::new("http://localhost", "m", 4)
            .unwrap()
            .with_api_key("");
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn test_response_parsing_orders_by_index() {
        let body =
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
    }
}
