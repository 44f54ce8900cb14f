//! The registry backend trait.

use async_trait::async_trait;

use crate::error::{RegistryError, Result};
use crate::model::{ModelVersion, RegisteredModel, Stage};

/// A model registry backend.
///
/// Every mutation is a single backend call. Implementations must make
/// [`set_alias`](ModelRegistry::set_alias) move the alias in one step, so
/// readers never see two versions holding it.
///
/// # Example
///
/// ```rust,ignore
/// use ragline_registry::{InMemoryRegistry, ModelRegistry};
///
/// let registry = InMemoryRegistry::new();
/// registry.create_registered_model("rag_pipeline").await?;
/// let v1 = registry.create_model_version("rag_pipeline", "artifacts/pipeline.json", None).await?;
/// registry.set_alias("rag_pipeline", "prod", v1.version).await?;
/// ```
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Backend name used in logs.
    fn backend(&self) -> &'static str;

    /// Create a registered model.
    ///
    /// Fails with [`RegistryError::AlreadyExists`] if it exists.
    async fn create_registered_model(&self, name: &str) -> Result<()>;

    /// Fetch a registered model with all of its versions.
    async fn get_registered_model(&self, name: &str) -> Result<RegisteredModel>;

    /// Append a new version. Version numbers are assigned by the backend.
    async fn create_model_version(
        &self,
        name: &str,
        artifact_ref: &str,
        run_id: Option<&str>,
    ) -> Result<ModelVersion>;

    async fn get_model_version(&self, name: &str, version: u64) -> Result<ModelVersion>;

    /// Point `alias` at `version`, removing it from any previous holder.
    async fn set_alias(&self, name: &str, alias: &str, version: u64) -> Result<()>;

    /// Remove `alias` from whichever version holds it.
    ///
    /// Fails with [`RegistryError::AliasNotFound`] if no version holds it.
    async fn delete_alias(&self, name: &str, alias: &str) -> Result<()>;

    /// The version `alias` points at, or [`RegistryError::AliasNotFound`].
    async fn get_version_by_alias(&self, name: &str, alias: &str) -> Result<ModelVersion>;

    /// Move `version` to `stage`.
    ///
    /// With `archive_existing`, other versions currently in `stage` move to
    /// [`Stage::Archived`] in the same call.
    async fn transition_stage(
        &self,
        name: &str,
        version: u64,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersion>;

    /// The newest version in `stage`, if any.
    async fn latest_in_stage(&self, name: &str, stage: Stage) -> Result<Option<ModelVersion>> {
        let model = self.get_registered_model(name).await?;
        Ok(model.in_stage(stage).into_iter().max_by_key(|v| v.version).cloned())
    }
}

/// `Ok(None)` for a missing alias, the error otherwise.
pub(crate) fn alias_holder(result: Result<ModelVersion>) -> Result<Option<ModelVersion>> {
    match result {
        Ok(version) => Ok(Some(version)),
        Err(RegistryError::AliasNotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
