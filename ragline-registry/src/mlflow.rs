//! MLflow Model Registry over its REST API.
//!
//! Only available with the `mlflow` feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragline_registry::{LifecycleManager, mlflow::MlflowRegistry};
//!
//! let registry = MlflowRegistry::from_env()?;
//! let lifecycle = LifecycleManager::new(Arc::new(registry));
//! lifecycle.register_and_promote("rag_pipeline", "artifacts/pipeline.json", None, "prod").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use crate::error::{RegistryError, Result};
use crate::model::{ModelVersion, RegisteredModel, Stage};
use crate::registry::ModelRegistry;

const API_PREFIX: &str = "api/2.0/mlflow";

/// A [`ModelRegistry`] talking to an MLflow tracking server.
pub struct MlflowRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl MlflowRegistry {
    /// Connect to the tracking server at `tracking_uri`.
    pub fn new(tracking_uri: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = tracking_uri.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::backend("connect", &base_url, e))?;
        Ok(Self { client, base_url })
    }

    /// Connect using `MLFLOW_TRACKING_URI`, which must be set.
    pub fn from_env() -> Result<Self> {
        let uri = std::env::var("MLFLOW_TRACKING_URI")
            .ok()
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| {
                RegistryError::backend(
                    "connect",
                    "mlflow",
                    "MLFLOW_TRACKING_URI is not set (e.g. http://127.0.0.1:5001)",
                )
            })?;
        Self::new(uri, Duration::from_secs(30))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{API_PREFIX}/{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
        name: &str,
    ) -> std::result::Result<T, ApiFailure> {
        let response = request.send().await.map_err(|e| {
            error!(operation, model = name, error = %e, "mlflow request failed");
            ApiFailure::Transport(e.to_string())
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| ApiFailure::Transport(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiError>(&body).unwrap_or(ApiError {
                error_code: status.to_string(),
                message: body.clone(),
            });
            debug!(operation, model = name, %status, code = %detail.error_code, "mlflow api error");
            return Err(ApiFailure::Api(detail));
        }
        serde_json::from_str(&body)
            .map_err(|e| ApiFailure::Transport(format!("bad response: {e}")))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        operation: &str,
        name: &str,
    ) -> std::result::Result<T, ApiFailure> {
        self.send(self.client.get(self.url(path)).query(query), operation, name).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
        operation: &str,
        name: &str,
    ) -> std::result::Result<T, ApiFailure> {
        self.send(self.client.post(self.url(path)).json(&body), operation, name).await
    }

    async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        operation: &str,
        name: &str,
    ) -> std::result::Result<T, ApiFailure> {
        self.send(self.client.delete(self.url(path)).query(query), operation, name).await
    }
}

// ── MLflow API types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

enum ApiFailure {
    Transport(String),
    Api(ApiError),
}

impl ApiFailure {
    fn code(&self) -> Option<&str> {
        match self {
            Self::Api(e) => Some(e.error_code.as_str()),
            Self::Transport(_) => None,
        }
    }

    fn into_backend(self, operation: &str, name: &str) -> RegistryError {
        match self {
            Self::Transport(message) => RegistryError::backend(operation, name, message),
            Self::Api(e) => RegistryError::backend(
                operation,
                name,
                format!("{}: {}", e.error_code, e.message),
            ),
        }
    }
}

const ALREADY_EXISTS: &str = "RESOURCE_ALREADY_EXISTS";
const DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

/// MLflow reports an unknown alias as either code.
fn is_missing_alias(failure: &ApiFailure) -> bool {
    matches!(failure.code(), Some(DOES_NOT_EXIST) | Some("INVALID_PARAMETER_VALUE"))
}

#[derive(Debug, Serialize, Deserialize)]
struct MlflowModelVersion {
    name: String,
    version: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    current_stage: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    creation_timestamp: Option<i64>,
}

impl MlflowModelVersion {
    fn into_version(self) -> Result<ModelVersion> {
        let version = self.version.parse().map_err(|_| {
            let message = format!("bad version '{}'", self.version);
            RegistryError::backend("parse_version", &self.name, message)
        })?;
        let stage = self.current_stage.as_deref().unwrap_or("None").parse().unwrap_or_default();
        Ok(ModelVersion {
            name: self.name,
            version,
            artifact_ref: self.source,
            run_id: self.run_id.filter(|id| !id.is_empty()),
            stage,
            aliases: self.aliases,
            created_at: self.creation_timestamp.and_then(DateTime::<Utc>::from_timestamp_millis),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ModelVersionEnvelope {
    model_version: MlflowModelVersion,
}

#[derive(Debug, Deserialize)]
struct SearchVersionsResponse {
    #[serde(default)]
    model_versions: Vec<MlflowModelVersion>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

// ── ModelRegistry implementation ───────────────────────────────────

#[async_trait]
impl ModelRegistry for MlflowRegistry {
    fn backend(&self) -> &'static str {
        "mlflow"
    }

    async fn create_registered_model(&self, name: &str) -> Result<()> {
        match self
            .post::<serde_json::Value>(
                "registered-models/create",
                json!({ "name": name }),
                "create_registered_model",
                name,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(ALREADY_EXISTS) => {
                Err(RegistryError::AlreadyExists { name: name.to_string() })
            }
            Err(e) => Err(e.into_backend("create_registered_model", name)),
        }
    }

    async fn get_registered_model(&self, name: &str) -> Result<RegisteredModel> {
        let filter = format!("name='{}'", name.replace('\'', "\\'"));
        let mut versions = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("filter", filter.as_str()), ("max_results", "200")];
            if let Some(token) = page_token.as_deref() {
                query.push(("page_token", token));
            }
            let page: SearchVersionsResponse = self
                .get("model-versions/search", &query, "get_registered_model", name)
                .await
                .map_err(|e| e.into_backend("get_registered_model", name))?;
            for version in page.model_versions {
                versions.push(version.into_version()?);
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if versions.is_empty() {
            // Search cannot tell "no versions" from "no model".
            let lookup = self
                .get::<serde_json::Value>(
                    "registered-models/get",
                    &[("name", name)],
                    "get_registered_model",
                    name,
                )
                .await;
            match lookup {
                Ok(_) => {}
                Err(e) if e.code() == Some(DOES_NOT_EXIST) => {
                    return Err(RegistryError::ModelNotFound { name: name.to_string() });
                }
                Err(e) => return Err(e.into_backend("get_registered_model", name)),
            }
        }

        versions.sort_by_key(|v| v.version);
        Ok(RegisteredModel { name: name.to_string(), versions })
    }

    async fn create_model_version(
        &self,
        name: &str,
        artifact_ref: &str,
        run_id: Option<&str>,
    ) -> Result<ModelVersion> {
        let mut body = json!({ "name": name, "source": artifact_ref });
        if let Some(run_id) = run_id {
            body["run_id"] = json!(run_id);
        }
        let created = self
            .post::<ModelVersionEnvelope>(
                "model-versions/create",
                body,
                "create_model_version",
                name,
            )
            .await;
        match created {
            Ok(envelope) => envelope.model_version.into_version(),
            Err(e) if e.code() == Some(DOES_NOT_EXIST) => {
                Err(RegistryError::ModelNotFound { name: name.to_string() })
            }
            Err(e) => Err(e.into_backend("create_model_version", name)),
        }
    }

    async fn get_model_version(&self, name: &str, version: u64) -> Result<ModelVersion> {
        let version_str = version.to_string();
        match self
            .get::<ModelVersionEnvelope>(
                "model-versions/get",
                &[("name", name), ("version", version_str.as_str())],
                "get_model_version",
                name,
            )
            .await
        {
            Ok(envelope) => envelope.model_version.into_version(),
            Err(e) if e.code() == Some(DOES_NOT_EXIST) => {
                Err(RegistryError::VersionNotFound { name: name.to_string(), version })
            }
            Err(e) => Err(e.into_backend("get_model_version", name)),
        }
    }

    async fn set_alias(&self, name: &str, alias: &str, version: u64) -> Result<()> {
        let body = json!({ "name": name, "alias": alias, "version": version.to_string() });
        match self.post::<Empty>("registered-models/alias", body, "set_alias", name).await {
            Ok(_) => {
                debug!(model = name, alias, version, "set mlflow alias");
                Ok(())
            }
            Err(e) if e.code() == Some(DOES_NOT_EXIST) => {
                Err(RegistryError::VersionNotFound { name: name.to_string(), version })
            }
            Err(e) => Err(e.into_backend("set_alias", name)),
        }
    }

    async fn get_version_by_alias(&self, name: &str, alias: &str) -> Result<ModelVersion> {
        match self
            .get::<ModelVersionEnvelope>(
                "registered-models/alias",
                &[("name", name), ("alias", alias)],
                "get_version_by_alias",
                name,
            )
            .await
        {
            Ok(envelope) => envelope.model_version.into_version(),
            Err(e) if is_missing_alias(&e) => Err(RegistryError::AliasNotFound {
                name: name.to_string(),
                alias: alias.to_string(),
            }),
            Err(e) => Err(e.into_backend("get_version_by_alias", name)),
        }
    }

    async fn delete_alias(&self, name: &str, alias: &str) -> Result<()> {
        match self
            .delete::<Empty>(
                "registered-models/alias",
                &[("name", name), ("alias", alias)],
                "delete_alias",
                name,
            )
            .await
        {
            Ok(_) => {
                debug!(model = name, alias, "deleted mlflow alias");
                Ok(())
            }
            Err(e) if is_missing_alias(&e) => Err(RegistryError::AliasNotFound {
                name: name.to_string(),
                alias: alias.to_string(),
            }),
            Err(e) => Err(e.into_backend("delete_alias", name)),
        }
    }

    async fn transition_stage(
        &self,
        name: &str,
        version: u64,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersion> {
        let body = json!({
            "name": name,
            "version": version.to_string(),
            "stage": stage.as_str(),
            "archive_existing_versions": archive_existing,
        });
        match self
            .post::<ModelVersionEnvelope>(
                "model-versions/transition-stage",
                body,
                "transition_stage",
                name,
            )
            .await
        {
            Ok(envelope) => envelope.model_version.into_version(),
            Err(e) if e.code() == Some(DOES_NOT_EXIST) => {
                Err(RegistryError::VersionNotFound { name: name.to_string(), version })
            }
            Err(e) => Err(e.into_backend("transition_stage", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_version() {
        let raw = r#"{
            "model_version": {
                "name": "rag_pipeline",
                "version": "4",
                "source": "runs:/abc/rag_model",
                "run_id": "abc",
                "current_stage": "Production",
                "aliases": ["prod"],
                "creation_timestamp": 1700000000000
            }
        }"#;
        let envelope: ModelVersionEnvelope = serde_json::from_str(raw).unwrap();
        let version = envelope.model_version.into_version().unwrap();
        assert_eq!(version.version, 4);
        assert_eq!(version.stage, Stage::Production);
        assert_eq!(version.artifact_ref, "runs:/abc/rag_model");
        assert!(version.holds_alias("prod"));
        assert!(version.created_at.is_some());
    }

    #[test]
    fn test_missing_optional_fields() {
        let raw = r#"{"name": "m", "version": "1"}"#;
        let version: MlflowModelVersion = serde_json::from_str(raw).unwrap();
        let version = version.into_version().unwrap();
        assert_eq!(version.stage, Stage::None);
        assert!(version.aliases.is_empty());
        assert_eq!(version.run_id, None);
    }

    #[test]
    fn test_error_body_parsing() {
        let raw = r#"{
            "error_code": "RESOURCE_ALREADY_EXISTS",
            "message": "Registered Model (name=m) already exists."
        }"#;
        let failure = ApiFailure::Api(serde_json::from_str(raw).unwrap());
        assert_eq!(failure.code(), Some(ALREADY_EXISTS));
        let error = failure.into_backend("create_registered_model", "m");
        assert!(error.to_string().contains("already exists"));
    }

    #[test]
    fn test_url_building() {
        let registry =
            MlflowRegistry::new("http://127.0.0.1:5001/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            registry.url("registered-models/create"),
            "http://127.0.0.1:5001/api/2.0/mlflow/registered-models/create"
        );
    }
}
