//! In-process registry.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::model::{ModelVersion, RegisteredModel, Stage};
use crate::registry::ModelRegistry;

#[derive(Debug, Default)]
struct Entry {
    versions: Vec<ModelVersion>,
    last_version: u64,
}

/// A [`ModelRegistry`] held in memory.
///
/// All mutations take one write lock, so every call is atomic with respect
/// to readers. Useful for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    models: RwLock<HashMap<String, Entry>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

fn model_not_found(name: &str) -> RegistryError {
    RegistryError::ModelNotFound { name: name.to_string() }
}

fn find_version<'a>(
    entry: &'a mut Entry,
    name: &str,
    version: u64,
) -> Result<&'a mut ModelVersion> {
    entry
        .versions
        .iter_mut()
        .find(|v| v.version == version)
        .ok_or_else(|| RegistryError::VersionNotFound { name: name.to_string(), version })
}

#[async_trait]
impl ModelRegistry for InMemoryRegistry {
    fn backend(&self) -> &'static str {
        "in-memory"
    }

    async fn create_registered_model(&self, name: &str) -> Result<()> {
        let mut models = self.models.write().await;
        if models.contains_key(name) {
            return Err(RegistryError::AlreadyExists { name: name.to_string() });
        }
        models.insert(name.to_string(), Entry::default());
        Ok(())
    }

    async fn get_registered_model(&self, name: &str) -> Result<RegisteredModel> {
        let models = self.models.read().await;
        let entry = models.get(name).ok_or_else(|| model_not_found(name))?;
        Ok(RegisteredModel { name: name.to_string(), versions: entry.versions.clone() })
    }

    async fn create_model_version(
        &self,
        name: &str,
        artifact_ref: &str,
        run_id: Option<&str>,
    ) -> Result<ModelVersion> {
        let mut models = self.models.write().await;
        let entry = models.get_mut(name).ok_or_else(|| model_not_found(name))?;
        entry.last_version += 1;
        let version = ModelVersion {
            name: name.to_string(),
            version: entry.last_version,
            artifact_ref: artifact_ref.to_string(),
            run_id: run_id.map(str::to_string),
            stage: Stage::None,
            aliases: Vec::new(),
            created_at: Some(Utc::now()),
        };
        entry.versions.push(version.clone());
        debug!(model = name, version = version.version, "created model version");
        Ok(version)
    }

    async fn get_model_version(&self, name: &str, version: u64) -> Result<ModelVersion> {
        let models = self.models.read().await;
        let entry = models.get(name).ok_or_else(|| model_not_found(name))?;
        entry
            .versions
            .iter()
            .find(|v| v.version == version)
            .cloned()
            .ok_or_else(|| RegistryError::VersionNotFound { name: name.to_string(), version })
    }

    async fn set_alias(&self, name: &str, alias: &str, version: u64) -> Result<()> {
        let mut models = self.models.write().await;
        let entry = models.get_mut(name).ok_or_else(|| model_not_found(name))?;
        find_version(entry, name, version)?;
        for v in &mut entry.versions {
            v.aliases.retain(|a| a != alias);
        }
        find_version(entry, name, version)?.aliases.push(alias.to_string());
        Ok(())
    }

    async fn delete_alias(&self, name: &str, alias: &str) -> Result<()> {
        let mut models = self.models.write().await;
        let entry = models.get_mut(name).ok_or_else(|| model_not_found(name))?;
        let holder = entry.versions.iter_mut().find(|v| v.holds_alias(alias)).ok_or_else(|| {
            RegistryError::AliasNotFound { name: name.to_string(), alias: alias.to_string() }
        })?;
        holder.aliases.retain(|a| a != alias);
        Ok(())
    }

    async fn get_version_by_alias(&self, name: &str, alias: &str) -> Result<ModelVersion> {
        let models = self.models.read().await;
        let entry = models.get(name).ok_or_else(|| model_not_found(name))?;
        entry.versions.iter().find(|v| v.holds_alias(alias)).cloned().ok_or_else(|| {
            RegistryError::AliasNotFound { name: name.to_string(), alias: alias.to_string() }
        })
    }

    async fn transition_stage(
        &self,
        name: &str,
        version: u64,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersion> {
        let mut models = self.models.write().await;
        let entry = models.get_mut(name).ok_or_else(|| model_not_found(name))?;
        find_version(entry, name, version)?;
        if archive_existing && stage != Stage::Archived {
            let others =
                entry.versions.iter_mut().filter(|v| v.version != version && v.stage == stage);
            for v in others {
                v.stage = Stage::Archived;
            }
        }
        let target = find_version(entry, name, version)?;
        target.stage = stage;
        Ok(target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_versions_are_monotonic() {
        let registry = InMemoryRegistry::new();
        registry.create_registered_model("m").await.unwrap();
        let v1 = registry.create_model_version("m", "a", None).await.unwrap();
        let v2 = registry.create_model_version("m", "b", Some("run-2")).await.unwrap();
        assert_eq!((v1.version, v2.version), (1, 2));
        assert_eq!(v2.run_id.as_deref(), Some("run-2"));
    }

    #[tokio::test]
    async fn test_create_twice_reports_already_exists() {
        let registry = InMemoryRegistry::new();
        registry.create_registered_model("m").await.unwrap();
        let again = registry.create_registered_model("m").await;
        assert!(matches!(again, Err(RegistryError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_set_alias_moves_it() {
        let registry = InMemoryRegistry::new();
        registry.create_registered_model("m").await.unwrap();
        registry.create_model_version("m", "a", None).await.unwrap();
        registry.create_model_version("m", "b", None).await.unwrap();

        registry.set_alias("m", "prod", 1).await.unwrap();
        registry.set_alias("m", "prod", 2).await.unwrap();

        let model = registry.get_registered_model("m").await.unwrap();
        assert_eq!(model.alias_holders("prod").len(), 1);
        assert_eq!(registry.get_version_by_alias("m", "prod").await.unwrap().version, 2);
        assert!(matches!(
            registry.set_alias("m", "prod", 9).await,
            Err(RegistryError::VersionNotFound { version: 9, .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_alias() {
        let registry = InMemoryRegistry::new();
        registry.create_registered_model("m").await.unwrap();
        registry.create_model_version("m", "a", None).await.unwrap();
        registry.set_alias("m", "prod", 1).await.unwrap();
        registry.set_alias("m", "canary", 1).await.unwrap();

        registry.delete_alias("m", "prod").await.unwrap();
        assert!(matches!(
            registry.get_version_by_alias("m", "prod").await,
            Err(RegistryError::AliasNotFound { .. })
        ));
        assert_eq!(registry.get_version_by_alias("m", "canary").await.unwrap().version, 1);
        assert!(matches!(
            registry.delete_alias("m", "prod").await,
            Err(RegistryError::AliasNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_transition_archives_existing() {
        let registry = InMemoryRegistry::new();
        registry.create_registered_model("m").await.unwrap();
        registry.create_model_version("m", "a", None).await.unwrap();
        registry.create_model_version("m", "b", None).await.unwrap();

        registry.transition_stage("m", 1, Stage::Production, true).await.unwrap();
        registry.transition_stage("m", 2, Stage::Production, true).await.unwrap();

        assert_eq!(registry.get_model_version("m", 1).await.unwrap().stage, Stage::Archived);
        let latest = registry.latest_in_stage("m", Stage::Production).await.unwrap();
        assert_eq!(latest.map(|v| v.version), Some(2));
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let registry = InMemoryRegistry::new();
        assert!(matches!(
            registry.create_model_version("ghost", "a", None).await,
            Err(RegistryError::ModelNotFound { .. })
        ));
    }
}
