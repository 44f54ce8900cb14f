//! # ragline-registry
//!
//! Versioned registration and alias promotion for packaged Ragline
//! pipelines.
//!
//! - [`ModelRegistry`] - the backend trait ([`InMemoryRegistry`], and
//!   `mlflow::MlflowRegistry` with the `mlflow` feature)
//! - [`LifecycleManager`] - idempotent model creation, registration,
//!   serialized promotion and [`ModelUri`] resolution
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragline_registry::{InMemoryRegistry, LifecycleManager, ModelUri};
//!
//! let lifecycle = LifecycleManager::new(Arc::new(InMemoryRegistry::new()));
//! let (version, _) = lifecycle
//!     .register_and_promote("rag_pipeline", "artifacts/pipeline.json", None, "prod")
//!     .await?;
//! let serving = lifecycle.resolve(&"models:/rag_pipeline@prod".parse()?).await?;
//! assert_eq!(serving.version, version.version);
//! ```

pub mod error;
pub mod inmemory;
pub mod lifecycle;
pub mod model;
pub mod registry;
pub mod uri;

#[cfg(feature = "mlflow")]
pub mod mlflow;

pub use error::{RegistryError, Result};
pub use inmemory::InMemoryRegistry;
pub use lifecycle::{DEFAULT_SERVING_ALIAS, LifecycleManager, PromotionReport};
pub use model::{CreateOutcome, ModelVersion, RegisteredModel, Stage};
pub use registry::ModelRegistry;
pub use uri::{DEFAULT_MODEL_URI, ModelUri, VersionSelector};

#[cfg(feature = "mlflow")]
pub use mlflow::MlflowRegistry;
