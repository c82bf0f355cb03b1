//! Provider configuration.
//!
//! Configuration arrives as JSON through `configure`, is validated against
//! [`ProviderConfig::schema`], then deserialized into [`ProviderConfig`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::validation::validate_config;

/// Environment variable consulted when `base_dir` is not configured.
pub const SCHEMA_DIR_ENV: &str = "MINECRAFT_SCHEMA_DIR";

/// Typed provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Directory that relative `schema_path` values resolve against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
}

impl ProviderConfig {
    /// Schema for the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Configuration for the Minecraft provider")
            .with_attribute(
                "base_dir",
                Attribute::optional_string().with_description(format!(
                    "Directory relative schema paths resolve against. \
                     Defaults to ${} or the working directory",
                    SCHEMA_DIR_ENV
                )),
            )
    }

    /// Validate raw configuration, returning error diagnostics if invalid.
    pub fn validate(raw: &serde_json::Value) -> Vec<Diagnostic> {
        validate_config(&Self::schema(), raw)
    }

    /// Parse raw configuration, filling `base_dir` from the environment.
    pub fn from_value(raw: serde_json::Value) -> Result<Self, ProviderError> {
        let config: Self = match raw {
            serde_json::Value::Null => Self::default(),
            raw => serde_json::from_value(raw)
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
        };
        Ok(config.with_env_fallback(std::env::var_os(SCHEMA_DIR_ENV)))
    }

    /// Use `env` as `base_dir` when none is configured. Empty values are ignored.
    pub fn with_env_fallback(mut self, env: Option<OsString>) -> Self {
        if self.base_dir.is_none() {
            self.base_dir = env.filter(|dir| !dir.is_empty()).map(PathBuf::from);
        }
        self
    }

    /// Resolve a configured schema path to the file that should be read.
    pub fn resolve(&self, schema_path: &str) -> PathBuf {
        let path = Path::new(schema_path);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}
