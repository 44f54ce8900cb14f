//! Registration and promotion of pipeline versions.
//!
//! [`LifecycleManager`] is the only writer of stages and aliases. Promoting
//! a version to the serving alias (`prod` unless configured otherwise) runs
//! under a per-name lock and performs, in order:
//!
//! 1. move the serving alias to the new version (one backend call),
//! 2. transition the new version to `Production`, archiving the previous
//!    `Production` holder in the same call,
//! 3. archive the previous alias holder if step 2 did not,
//! 4. re-read the registry and, if a concurrent writer left the alias and
//!    the `Production` stage on different versions, move `Production` to
//!    whichever version the alias ended on.
//!
//! The lock only serializes promotions issued through one manager; step 4
//! is what keeps managers in different processes consistent, with the
//! registry's last alias write deciding the winner.
//!
//! If step 2 fails the alias is moved back to its previous holder (or
//! removed, on a first promotion) and the caller gets
//! [`RegistryError::PartialPromotion`]. Any other alias moves on its own
//! and never touches stages.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::error::{RegistryError, Result};
use crate::model::{CreateOutcome, ModelVersion, Stage};
use crate::registry::{ModelRegistry, alias_holder};
use crate::uri::{ModelUri, VersionSelector};

/// Alias that travels together with the `Production` stage.
pub const DEFAULT_SERVING_ALIAS: &str = "prod";

const RECONCILE_ATTEMPTS: usize = 3;

/// What a promotion did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionReport {
    pub name: String,
    pub version: u64,
    pub alias: String,
    /// The version that held the alias before, if any.
    pub previous: Option<u64>,
    /// False when the version already held the alias (and, for the serving
    /// alias, `Production`).
    pub changed: bool,
}

/// Registers and promotes model versions over a [`ModelRegistry`].
pub struct LifecycleManager {
    registry: Arc<dyn ModelRegistry>,
    serving_alias: String,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<dyn ModelRegistry>) -> Self {
        Self {
            registry,
            serving_alias: DEFAULT_SERVING_ALIAS.to_string(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use `alias` instead of `prod` as the alias bound to `Production`.
    pub fn with_serving_alias(mut self, alias: impl Into<String>) -> Self {
        self.serving_alias = alias.into();
        self
    }

    pub fn registry(&self) -> &Arc<dyn ModelRegistry> {
        &self.registry
    }

    pub fn serving_alias(&self) -> &str {
        &self.serving_alias
    }

    async fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Create the registered model unless it already exists.
    ///
    /// Only "already exists" is treated as success; every other failure is
    /// returned.
    pub async fn ensure_registered_model(&self, name: &str) -> Result<CreateOutcome> {
        match self.registry.create_registered_model(name).await {
            Ok(()) => {
                info!(model = name, backend = self.registry.backend(), "created registered model");
                Ok(CreateOutcome::Created)
            }
            Err(RegistryError::AlreadyExists { .. }) => Ok(CreateOutcome::AlreadyExisted),
            Err(e) => {
                error!(model = name, error = %e, "failed to create registered model");
                Err(e)
            }
        }
    }

    /// Ensure the model entry exists and append a version for `artifact_ref`.
    pub async fn register(
        &self,
        name: &str,
        artifact_ref: &str,
        run_id: Option<&str>,
    ) -> Result<ModelVersion> {
        self.ensure_registered_model(name).await?;
        let version = self.registry.create_model_version(name, artifact_ref, run_id).await?;
        info!(model = name, version = version.version, artifact_ref, "registered model version");
        Ok(version)
    }

    /// Point `alias` at `version`.
    ///
    /// For the serving alias, `version` also becomes the only `Production`
    /// version and the previous holder is archived. Promoting the current
    /// holder again is a no-op.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PartialPromotion`] if the stage could not follow
    ///   the alias
    /// - [`RegistryError::Superseded`] if a concurrent promotion through
    ///   another manager moved the alias last
    #[instrument(skip(self), fields(backend = self.registry.backend()))]
    pub async fn promote(&self, name: &str, version: u64, alias: &str) -> Result<PromotionReport> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        let target = self.registry.get_model_version(name, version).await?;
        let previous = alias_holder(self.registry.get_version_by_alias(name, alias).await)?;
        let previous_version = previous.as_ref().map(|p| p.version);
        let serving = alias == self.serving_alias;

        let report = |changed| PromotionReport {
            name: name.to_string(),
            version,
            alias: alias.to_string(),
            previous: previous_version,
            changed,
        };

        if previous_version == Some(version) && (!serving || target.stage == Stage::Production) {
            info!(model = name, version, alias, "version already promoted");
            return Ok(report(false));
        }

        self.registry.set_alias(name, alias, version).await?;

        if !serving {
            let holder = alias_holder(self.registry.get_version_by_alias(name, alias).await)?;
            if let Some(holder) = holder.filter(|h| h.version != version) {
                return Err(superseded(name, version, alias, holder.version));
            }
            info!(model = name, version, alias, previous = ?previous_version, "alias moved");
            return Ok(report(true));
        }

        if let Err(e) = self.registry.transition_stage(name, version, Stage::Production, true).await
        {
            error!(
                model = name,
                version,
                alias,
                error = %e,
                "stage transition failed, restoring alias"
            );
            let rolled_back = self.restore_alias(name, alias, version, previous_version).await;
            return Err(RegistryError::PartialPromotion {
                name: name.to_string(),
                version,
                alias: alias.to_string(),
                rolled_back,
                message: e.to_string(),
            });
        }

        if let Some(prev) = previous_version.filter(|prev| *prev != version) {
            let current = self.registry.get_model_version(name, prev).await;
            let needs_archive = current.as_ref().map_or(true, |v| v.stage != Stage::Archived);
            if needs_archive {
                self.registry
                    .transition_stage(name, prev, Stage::Archived, false)
                    .await
                    .map_err(|e| {
                        warn!(
                            model = name,
                            version = prev,
                            error = %e,
                            "failed to archive previous holder"
                        );
                        RegistryError::PartialPromotion {
                            name: name.to_string(),
                            version,
                            alias: alias.to_string(),
                            rolled_back: false,
                            message: format!("previous version {prev} not archived: {e}"),
                        }
                    })?;
            }
        }

        self.reconcile(name, version, alias).await?;
        info!(model = name, version, alias, previous = ?previous_version, "promotion committed");
        Ok(report(true))
    }

    /// Undo this promotion's alias move. Returns whether the alias is back
    /// where it was.
    async fn restore_alias(
        &self,
        name: &str,
        alias: &str,
        version: u64,
        previous: Option<u64>,
    ) -> bool {
        // A concurrent promotion may own the alias by now; leave it alone then.
        match alias_holder(self.registry.get_version_by_alias(name, alias).await) {
            Ok(Some(holder)) if holder.version == version => {}
            _ => return false,
        }
        let restored = match previous {
            Some(prev) if prev == version => return true,
            Some(prev) => self.registry.set_alias(name, alias, prev).await,
            None => self.registry.delete_alias(name, alias).await,
        };
        restored
            .map_err(|e| warn!(model = name, alias, error = %e, "failed to restore alias"))
            .is_ok()
    }

    /// Make the serving alias holder the only `Production` version.
    async fn reconcile(&self, name: &str, version: u64, alias: &str) -> Result<()> {
        for _ in 0..RECONCILE_ATTEMPTS {
            let model = self.registry.get_registered_model(name).await?;
            let production: Vec<u64> =
                model.in_stage(Stage::Production).iter().map(|v| v.version).collect();
            let Some(holder) = model.alias_holders(alias).first().map(|v| v.version) else {
                return Err(RegistryError::PartialPromotion {
                    name: name.to_string(),
                    version,
                    alias: alias.to_string(),
                    rolled_back: false,
                    message: "alias was removed by a concurrent writer".to_string(),
                });
            };

            if production == [holder] {
                return if holder == version {
                    Ok(())
                } else {
                    Err(superseded(name, version, alias, holder))
                };
            }

            warn!(
                model = name,
                alias,
                holder,
                ?production,
                "alias and Production disagree, reconciling"
            );
            self.registry.transition_stage(name, holder, Stage::Production, true).await?;
        }

        Err(RegistryError::PartialPromotion {
            name: name.to_string(),
            version,
            alias: alias.to_string(),
            rolled_back: false,
            message: format!(
                "alias and Production stage still disagree after {RECONCILE_ATTEMPTS} attempts"
            ),
        })
    }

    /// [`register`](Self::register) followed by [`promote`](Self::promote).
    pub async fn register_and_promote(
        &self,
        name: &str,
        artifact_ref: &str,
        run_id: Option<&str>,
        alias: &str,
    ) -> Result<(ModelVersion, PromotionReport)> {
        let registered = self.register(name, artifact_ref, run_id).await?;
        let report = self.promote(name, registered.version, alias).await?;
        let version = self.registry.get_model_version(name, registered.version).await?;
        Ok((version, report))
    }

    /// The version addressed by `uri`.
    pub async fn resolve(&self, uri: &ModelUri) -> Result<ModelVersion> {
        match &uri.selector {
            VersionSelector::Version(version) => {
                self.registry.get_model_version(&uri.name, *version).await
            }
            VersionSelector::Alias(alias) => {
                self.registry.get_version_by_alias(&uri.name, alias).await
            }
            VersionSelector::Stage(stage) => {
                self.registry.latest_in_stage(&uri.name, *stage).await?.ok_or_else(|| {
                    RegistryError::InvalidUri {
                        uri: uri.to_string(),
                        reason: format!("no version in stage {stage}"),
                    }
                })
            }
        }
    }
}

fn superseded(name: &str, version: u64, alias: &str, holder: u64) -> RegistryError {
    warn!(model = name, version, alias, holder, "promotion superseded by a concurrent writer");
    RegistryError::Superseded { name: name.to_string(), version, alias: alias.to_string(), holder }
}
