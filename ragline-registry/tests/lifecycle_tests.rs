//! Promotion and registration tests against the in-memory registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use ragline_registry::{
    CreateOutcome, InMemoryRegistry, LifecycleManager, ModelRegistry, ModelUri, ModelVersion,
    RegisteredModel, RegistryError, Result, Stage,
};

const MODEL: &str = "rag_pipeline";

async fn manager_with_versions(count: usize) -> LifecycleManager {
    let manager = LifecycleManager::new(Arc::new(InMemoryRegistry::new()));
    for i in 0..count {
        manager.register(MODEL, &format!("artifacts/v{i}.json"), None).await.unwrap();
    }
    manager
}

async fn snapshot(manager: &LifecycleManager) -> RegisteredModel {
    manager.registry().get_registered_model(MODEL).await.unwrap()
}

#[tokio::test]
async fn test_ensure_registered_model_is_idempotent() {
    let manager = LifecycleManager::new(Arc::new(InMemoryRegistry::new()));
    assert_eq!(manager.ensure_registered_model(MODEL).await.unwrap(), CreateOutcome::Created);
    assert_eq!(
        manager.ensure_registered_model(MODEL).await.unwrap(),
        CreateOutcome::AlreadyExisted
    );
}

#[tokio::test]
async fn test_promoting_same_version_twice_is_a_no_op() {
    let manager = manager_with_versions(1).await;

    let first = manager.promote(MODEL, 1, "prod").await.unwrap();
    let second = manager.promote(MODEL, 1, "prod").await.unwrap();
    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(second.previous, Some(1));

    let model = snapshot(&manager).await;
    let holders: Vec<u64> = model.alias_holders("prod").iter().map(|v| v.version).collect();
    assert_eq!(holders, vec![1]);
    assert_eq!(model.version(1).unwrap().stage, Stage::Production);
}

#[tokio::test]
async fn test_promotion_logs_committed_event() {
    let capture = ragline_telemetry::EventCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let manager = manager_with_versions(2).await;
    manager.promote(MODEL, 1, "prod").await.unwrap();
    manager.promote(MODEL, 2, "prod").await.unwrap();

    let committed = capture.with_message("promotion committed");
    assert_eq!(committed.len(), 2);
    let last = &committed[1];
    assert_eq!(last.field("version"), Some(&serde_json::json!(2)));
    assert_eq!(last.field("alias"), Some(&serde_json::json!("prod")));
    assert_eq!(last.field("previous"), Some(&serde_json::json!("Some(1)")));
    assert_eq!(last.span.as_deref(), Some("promote"));
}

#[tokio::test]
async fn test_promoting_new_version_archives_previous() {
    let manager = manager_with_versions(2).await;
    manager.promote(MODEL, 1, "prod").await.unwrap();
    let report = manager.promote(MODEL, 2, "prod").await.unwrap();
    assert_eq!(report.previous, Some(1));

    let model = snapshot(&manager).await;
    let v1 = model.version(1).unwrap();
    let v2 = model.version(2).unwrap();
    assert_eq!(v1.stage, Stage::Archived);
    assert!(!v1.holds_alias("prod"));
    assert_eq!(v2.stage, Stage::Production);
    assert!(v2.holds_alias("prod"));
}

#[tokio::test]
async fn test_alias_holder_outside_production_is_archived() {
    let manager = manager_with_versions(2).await;
    manager.registry().set_alias(MODEL, "prod", 1).await.unwrap();
    manager.registry().transition_stage(MODEL, 1, Stage::Staging, false).await.unwrap();

    manager.promote(MODEL, 2, "prod").await.unwrap();
    assert_eq!(snapshot(&manager).await.version(1).unwrap().stage, Stage::Archived);
}

#[tokio::test]
async fn test_promote_unknown_version_changes_nothing() {
    let manager = manager_with_versions(1).await;
    manager.promote(MODEL, 1, "prod").await.unwrap();

    let result = manager.promote(MODEL, 5, "prod").await;
    assert!(matches!(result, Err(RegistryError::VersionNotFound { version: 5, .. })));
    assert!(snapshot(&manager).await.version(1).unwrap().holds_alias("prod"));
}

#[tokio::test]
async fn test_non_serving_alias_leaves_stages_alone() {
    let manager = manager_with_versions(2).await;
    manager.promote(MODEL, 1, "prod").await.unwrap();

    let report = manager.promote(MODEL, 2, "canary").await.unwrap();
    assert!(report.changed);
    assert_eq!(report.previous, None);

    let model = snapshot(&manager).await;
    let v1 = model.version(1).unwrap();
    let v2 = model.version(2).unwrap();
    assert_eq!(v1.stage, Stage::Production);
    assert!(v1.holds_alias("prod"));
    assert_eq!(v2.stage, Stage::None);
    assert!(v2.holds_alias("canary"));

    let serving = manager.resolve(&ModelUri::alias(MODEL, "prod")).await.unwrap();
    assert_eq!(serving.version, 1);
    let again = manager.promote(MODEL, 2, "canary").await.unwrap();
    assert!(!again.changed);
}

#[tokio::test]
async fn test_custom_serving_alias_owns_production() {
    let registry = Arc::new(InMemoryRegistry::new());
    let manager = LifecycleManager::new(registry).with_serving_alias("live");
    assert_eq!(manager.serving_alias(), "live");
    manager.register(MODEL, "a.json", None).await.unwrap();
    manager.register(MODEL, "b.json", None).await.unwrap();

    manager.promote(MODEL, 1, "prod").await.unwrap();
    assert_eq!(snapshot(&manager).await.version(1).unwrap().stage, Stage::None);

    manager.promote(MODEL, 1, "live").await.unwrap();
    manager.promote(MODEL, 2, "live").await.unwrap();
    let model = snapshot(&manager).await;
    assert_eq!(model.version(1).unwrap().stage, Stage::Archived);
    assert!(model.version(1).unwrap().holds_alias("prod"));
    assert_eq!(model.version(2).unwrap().stage, Stage::Production);
}

#[tokio::test]
async fn test_register_and_promote_then_resolve() {
    let manager = LifecycleManager::new(Arc::new(InMemoryRegistry::new()));
    let (v1, _) =
        manager.register_and_promote(MODEL, "a.json", Some("run-1"), "prod").await.unwrap();
    let (v2, report) = manager.register_and_promote(MODEL, "b.json", None, "prod").await.unwrap();
    assert_eq!((v1.version, v2.version), (1, 2));
    assert_eq!(report.previous, Some(1));
    assert_eq!(v2.stage, Stage::Production);

    let by_alias = manager.resolve(&"models:/rag_pipeline@prod".parse().unwrap()).await.unwrap();
    assert_eq!(by_alias.artifact_ref, "b.json");
    let by_stage =
        manager.resolve(&"models:/rag_pipeline/Production".parse().unwrap()).await.unwrap();
    assert_eq!(by_stage.version, 2);
    let by_version = manager.resolve(&ModelUri::version(MODEL, 1)).await.unwrap();
    assert_eq!(by_version.run_id.as_deref(), Some("run-1"));

    let missing = manager.resolve(&ModelUri::alias(MODEL, "canary")).await;
    assert!(matches!(missing, Err(RegistryError::AliasNotFound { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_promotions_leave_one_holder() {
    let manager = Arc::new(manager_with_versions(8).await);

    let reader = {
        let manager = manager.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let model = snapshot(&manager).await;
                assert!(model.alias_holders("prod").len() <= 1);
                assert!(model.in_stage(Stage::Production).len() <= 1);
                tokio::task::yield_now().await;
            }
        })
    };

    let promotions: Vec<_> = (1..=8u64)
        .map(|version| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.promote(MODEL, version, "prod").await })
        })
        .collect();
    for promotion in promotions {
        promotion.await.unwrap().unwrap();
    }
    reader.await.unwrap();

    let model = snapshot(&manager).await;
    let holders = model.alias_holders("prod");
    assert_eq!(holders.len(), 1);
    let winner = holders[0].version;
    assert_eq!(model.version(winner).unwrap().stage, Stage::Production);
    for version in model.versions.iter().filter(|v| v.version != winner) {
        assert_eq!(version.stage, Stage::Archived, "v{} not archived", version.version);
    }
}

/// Delegates to an in-memory registry, failing selected calls on demand.
#[derive(Default)]
struct FaultyRegistry {
    inner: InMemoryRegistry,
    fail_create: AtomicBool,
    fail_production: AtomicBool,
    /// Version whose next `Production` transition stalls before applying.
    slow_version: AtomicU64,
}

fn unavailable(operation: &str, name: &str) -> RegistryError {
    RegistryError::Backend {
        operation: operation.into(),
        name: name.into(),
        message: "connection refused".into(),
    }
}

#[async_trait]
impl ModelRegistry for FaultyRegistry {
    fn backend(&self) -> &'static str {
        "faulty"
    }

    async fn create_registered_model(&self, name: &str) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(unavailable("create_registered_model", name));
        }
        self.inner.create_registered_model(name).await
    }

    async fn get_registered_model(&self, name: &str) -> Result<RegisteredModel> {
        self.inner.get_registered_model(name).await
    }

    async fn create_model_version(
        &self,
        name: &str,
        artifact_ref: &str,
        run_id: Option<&str>,
    ) -> Result<ModelVersion> {
        self.inner.create_model_version(name, artifact_ref, run_id).await
    }

    async fn get_model_version(&self, name: &str, version: u64) -> Result<ModelVersion> {
        self.inner.get_model_version(name, version).await
    }

    async fn set_alias(&self, name: &str, alias: &str, version: u64) -> Result<()> {
        self.inner.set_alias(name, alias, version).await
    }

    async fn get_version_by_alias(&self, name: &str, alias: &str) -> Result<ModelVersion> {
        self.inner.get_version_by_alias(name, alias).await
    }

    async fn delete_alias(&self, name: &str, alias: &str) -> Result<()> {
        self.inner.delete_alias(name, alias).await
    }

    async fn transition_stage(
        &self,
        name: &str,
        version: u64,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersion> {
        if stage == Stage::Production && self.fail_production.load(Ordering::SeqCst) {
            return Err(unavailable("transition_stage", name));
        }
        let stalls = stage == Stage::Production
            && self
                .slow_version
                .compare_exchange(version, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
        if stalls {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.inner.transition_stage(name, version, stage, archive_existing).await
    }
}

#[tokio::test]
async fn test_create_failure_other_than_exists_is_surfaced() {
    let registry = Arc::new(FaultyRegistry::default());
    registry.fail_create.store(true, Ordering::SeqCst);
    let manager = LifecycleManager::new(registry);

    let result = manager.register(MODEL, "a.json", None).await;
    assert!(matches!(result, Err(RegistryError::Backend { .. })));
}

#[tokio::test]
async fn test_failed_stage_transition_restores_alias() {
    let registry = Arc::new(FaultyRegistry::default());
    let manager = LifecycleManager::new(registry.clone());
    manager.register_and_promote(MODEL, "a.json", None, "prod").await.unwrap();
    manager.register(MODEL, "b.json", None).await.unwrap();

    registry.fail_production.store(true, Ordering::SeqCst);
    let result = manager.promote(MODEL, 2, "prod").await;
    assert!(matches!(
        result,
        Err(RegistryError::PartialPromotion { version: 2, rolled_back: true, .. })
    ));

    let model = snapshot(&manager).await;
    let holders: Vec<u64> = model.alias_holders("prod").iter().map(|v| v.version).collect();
    assert_eq!(holders, vec![1]);
    assert_eq!(model.version(1).unwrap().stage, Stage::Production);
    assert_eq!(model.version(2).unwrap().stage, Stage::None);

    registry.fail_production.store(false, Ordering::SeqCst);
    let report = manager.promote(MODEL, 2, "prod").await.unwrap();
    assert!(report.changed);
}

#[tokio::test]
async fn test_failed_first_promotion_removes_alias() {
    let registry = Arc::new(FaultyRegistry::default());
    let manager = LifecycleManager::new(registry.clone());
    manager.register(MODEL, "a.json", None).await.unwrap();

    registry.fail_production.store(true, Ordering::SeqCst);
    let result = manager.promote(MODEL, 1, "prod").await;
    assert!(matches!(
        result,
        Err(RegistryError::PartialPromotion { version: 1, rolled_back: true, .. })
    ));

    let lookup = registry.get_version_by_alias(MODEL, "prod").await;
    assert!(matches!(lookup, Err(RegistryError::AliasNotFound { .. })));
    let model = snapshot(&manager).await;
    assert!(model.alias_holders("prod").is_empty());
    assert_eq!(model.version(1).unwrap().stage, Stage::None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_promotions_from_two_managers_converge() {
    let registry = Arc::new(FaultyRegistry::default());
    let first = LifecycleManager::new(registry.clone());
    let second = LifecycleManager::new(registry.clone());
    first.register(MODEL, "a.json", None).await.unwrap();
    first.register(MODEL, "b.json", None).await.unwrap();

    // v1's stage change lands after the second manager has fully promoted v2.
    registry.slow_version.store(1, Ordering::SeqCst);
    let (stalled, winner) = tokio::join!(first.promote(MODEL, 1, "prod"), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        second.promote(MODEL, 2, "prod").await
    });

    assert!(winner.unwrap().changed);
    assert!(matches!(
        stalled,
        Err(RegistryError::Superseded { version: 1, holder: 2, .. })
    ));

    let model = snapshot(&first).await;
    let holders: Vec<u64> = model.alias_holders("prod").iter().map(|v| v.version).collect();
    let production: Vec<u64> =
        model.in_stage(Stage::Production).iter().map(|v| v.version).collect();
    assert_eq!(holders, vec![2]);
    assert_eq!(production, vec![2]);
    assert_eq!(model.version(1).unwrap().stage, Stage::Archived);
}

/// **Property: promotion keeps a single live holder**
/// *For any* sequence of promotions, at most one version SHALL hold the
/// alias or the `Production` stage, and it SHALL be the last one promoted.
mod prop_promotion_sequence {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn last_promoted_version_is_sole_holder(
            sequence in proptest::collection::vec(1u64..=5, 1..15),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let model = rt.block_on(async {
                let manager = manager_with_versions(5).await;
                for version in &sequence {
                    manager.promote(MODEL, *version, "prod").await.unwrap();
                }
                snapshot(&manager).await
            });

            let last = *sequence.last().unwrap();
            let holders: Vec<u64> =
                model.alias_holders("prod").iter().map(|v| v.version).collect();
            let production: Vec<u64> =
                model.in_stage(Stage::Production).iter().map(|v| v.version).collect();
            prop_assert_eq!(holders, vec![last]);
            prop_assert_eq!(production, vec![last]);
            for version in &model.versions {
                if version.version != last && sequence.contains(&version.version) {
                    prop_assert_eq!(version.stage, Stage::Archived);
                }
            }
        }
    }
}
