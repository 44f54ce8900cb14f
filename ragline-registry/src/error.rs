//! Error types for the `ragline-registry` crate.

use thiserror::Error;

/// Errors that can occur while registering or promoting model versions.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registered model already exists.
    ///
    /// Only [`ensure_registered_model`](crate::LifecycleManager::ensure_registered_model)
    /// treats this as success.
    #[error("registered model '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("registered model '{name}' not found")]
    ModelNotFound { name: String },

    #[error("version {version} of model '{name}' not found")]
    VersionNotFound { name: String, version: u64 },

    #[error("alias '{alias}' of model '{name}' not found")]
    AliasNotFound { name: String, alias: String },

    /// The registry backend failed or was unreachable.
    #[error("registry backend error during {operation} on '{name}': {message}")]
    Backend { operation: String, name: String, message: String },

    /// The alias moved to the new version but a later promotion step failed.
    ///
    /// `rolled_back` tells whether the alias was restored to its previous
    /// holder.
    #[error(
        "promotion of '{name}' v{version} to '{alias}' is incomplete (rolled back: {rolled_back}): {message}"
    )]
    PartialPromotion {
        name: String,
        version: u64,
        alias: String,
        rolled_back: bool,
        message: String,
    },

    /// A concurrent promotion moved the alias after this one did.
    #[error("promotion of '{name}' v{version} to '{alias}' was superseded by v{holder}")]
    Superseded { name: String, version: u64, alias: String, holder: u64 },

    #[error("invalid model URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
}

/// A convenience result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl RegistryError {
    #[cfg(feature = "mlflow")]
    pub(crate) fn backend(operation: &str, name: &str, message: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation: operation.to_string(),
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error reports a missing model, version or alias.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound { .. } | Self::VersionNotFound { .. } | Self::AliasNotFound { .. }
        )
    }
}
