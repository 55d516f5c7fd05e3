//! Kernel configuration.
//!
//! All fields have defaults, so an empty document is a valid config:
//!
//! ```toml
//! [declaration]
//! default_scope = "instance"
//! default_exposure = "read_write"
//!
//! [propagation]
//! on_duplication_failure = "fail"
//! ```

use crate::spec::{Exposure, Scope};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// What propagation does when a stored value refuses to be copied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicationPolicy {
    /// Abort subtype or instance creation with a duplication error.
    #[default]
    Fail,

    /// Share the original reference and log a warning.
    Share,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeclarationConfig {
    pub default_scope: Scope,
    pub default_exposure: Exposure,
}

impl Default for DeclarationConfig {
    fn default() -> Self {
        Self {
            default_scope: Scope::Instance,
            default_exposure: Exposure::ReadWrite,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PropagationConfig {
    pub on_duplication_failure: DuplicationPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    pub declaration: DeclarationConfig,
    pub propagation: PropagationConfig,
}

impl KernelConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw, "<inline>")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw, &path.display().to_string())
    }

    fn parse(raw: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::ParseToml {
            path: path.to_string(),
            source,
        })
    }
}
