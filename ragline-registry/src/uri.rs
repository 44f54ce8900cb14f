//! `models:/` URIs.

use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;
use crate::model::Stage;

/// Default serving URI.
pub const DEFAULT_MODEL_URI: &str = "models:/rag_pipeline@prod";

/// How a [`ModelUri`] picks a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Version(u64),
    Stage(Stage),
    Alias(String),
}

/// A registry address: `models:/<name>/<version>`, `models:/<name>/<Stage>`
/// or `models:/<name>@<alias>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelUri {
    pub name: String,
    pub selector: VersionSelector,
}

impl ModelUri {
    pub fn alias(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self { name: name.into(), selector: VersionSelector::Alias(alias.into()) }
    }

    pub fn version(name: impl Into<String>, version: u64) -> Self {
        Self { name: name.into(), selector: VersionSelector::Version(version) }
    }

    /// Read `MODEL_URI`, falling back to [`DEFAULT_MODEL_URI`].
    pub fn from_env() -> Result<Self, RegistryError> {
        std::env::var("MODEL_URI")
            .ok()
            .filter(|uri| !uri.trim().is_empty())
            .as_deref()
            .unwrap_or(DEFAULT_MODEL_URI)
            .parse()
    }
}

impl FromStr for ModelUri {
    type Err = RegistryError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RegistryError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let rest = uri
            .trim()
            .strip_prefix("models:/")
            .ok_or_else(|| invalid("missing 'models:/' prefix"))?;

        if let Some((name, alias)) = rest.split_once('@') {
            if name.is_empty() || name.contains('/') {
                return Err(invalid("expected models:/<name>@<alias>"));
            }
            if alias.is_empty() {
                return Err(invalid("empty alias"));
            }
            return Ok(Self::alias(name, alias));
        }

        let (name, selector) =
            rest.split_once('/').ok_or_else(|| invalid("expected a version, stage or alias"))?;
        if name.is_empty() || selector.is_empty() || selector.contains('/') {
            return Err(invalid("expected models:/<name>/<version or stage>"));
        }
        let selector = match selector.parse::<u64>() {
            Ok(version) => VersionSelector::Version(version),
            Err(_) => {
                VersionSelector::Stage(selector.parse().map_err(|_| invalid("unknown stage"))?)
            }
        };
        Ok(Self { name: name.to_string(), selector })
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            VersionSelector::Version(v) => write!(f, "models:/{}/{v}", self.name),
            VersionSelector::Stage(stage) => write!(f, "models:/{}/{stage}", self.name),
            VersionSelector::Alias(alias) => write!(f, "models:/{}@{alias}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            DEFAULT_MODEL_URI.parse::<ModelUri>().unwrap(),
            ModelUri::alias("rag_pipeline", "prod")
        );
        assert_eq!(
            "models:/rag_pipeline/3".parse::<ModelUri>().unwrap(),
            ModelUri::version("rag_pipeline", 3)
        );
        assert_eq!(
            "models:/rag_pipeline/Production".parse::<ModelUri>().unwrap().selector,
            VersionSelector::Stage(Stage::Production)
        );
    }

    #[test]
    fn test_display_round_trips() {
        for uri in ["models:/m@prod", "models:/m/7", "models:/m/Staging"] {
            assert_eq!(uri.parse::<ModelUri>().unwrap().to_string(), uri);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        let malformed = [
            "runs:/abc/model",
            "models:/",
            "models:/m",
            "models:/m@",
            "models:/@prod",
            "models:/m/Live",
            "models:/m/1/2",
        ];
        for uri in malformed {
            assert!(
                matches!(uri.parse::<ModelUri>(), Err(RegistryError::InvalidUri { .. })),
                "{uri} should be rejected"
            );
        }
    }
}
