//! # Configuration Module
//!
//! The provider map and bootstrap switches, bound from a YAML/JSON file or
//! from layered `config` crate sources.
//!
//! ```yaml
//! pubsub:
//!   providers:
//!     InMemory1:
//!       type: InMemory
//!       retries: [1, "00:00:05"]
//!     Orders:
//!       type: RabbitMq
//!       connection_string: amqp://broker:5672
//!       redeliveries: ["30s", "5m"]
//! ```

use crate::error::ConfigurationError;
use crate::provider::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Section holding the pub/sub configuration in a larger document
pub const CONFIG_SECTION: &str = "pubsub";

/// Prefix of environment variables overriding configuration values
/// (`PUBSUB__PROVIDERS__MEMORY__TYPE=InMemory`)
pub const ENV_PREFIX: &str = "PUBSUB";

/// Complete pub/sub configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PubSubConfiguration {
    /// Providers keyed by provider key; registered in key order
    #[serde(default, alias = "Providers")]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Bind consumers to anonymous, auto-removed queues (tests and local runs)
    #[serde(default, alias = "EphemeralQueues")]
    pub ephemeral_queues: bool,

    /// Case-insensitive regex narrowing discovered consumers by type name
    #[serde(default, alias = "NamespaceFilter")]
    pub namespace_filter: Option<String>,
}

impl PubSubConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider under `key`
    pub fn with_provider(mut self, key: impl Into<String>, provider: ProviderConfig) -> Self {
        let key = key.into();
        self.providers.insert(key.clone(), provider.with_key(key));
        self
    }

    pub fn with_ephemeral_queues(mut self, enabled: bool) -> Self {
        self.ephemeral_queues = enabled;
        self
    }

    pub fn with_namespace_filter(mut self, pattern: impl Into<String>) -> Self {
        self.namespace_filter = Some(pattern.into());
        self
    }

    /// Copy every map key into its provider entry
    pub fn assign_keys(&mut self) {
        for (key, provider) in self.providers.iter_mut() {
            provider.key = key.clone();
        }
    }

    /// Providers in registration order
    pub fn providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.values()
    }

    /// Validate the provider map.
    ///
    /// # Errors
    /// - `ConfigurationError::MissingProviders` - No providers configured
    /// - `ConfigurationError::EmptyKey` - A provider has an empty key
    /// - `ConfigurationError::DuplicateKey` - Two keys differ only by case
    /// - `ConfigurationError::UnsupportedTransport` - Unknown transport type
    /// - `ConfigurationError::InvalidValue` - Invalid provider field
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.providers.is_empty() {
            return Err(ConfigurationError::MissingProviders {
                section: CONFIG_SECTION.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (key, provider) in &self.providers {
            if key.trim().is_empty() {
                return Err(ConfigurationError::EmptyKey);
            }
            if !seen.insert(key.trim().to_lowercase()) {
                return Err(ConfigurationError::DuplicateKey { key: key.clone() });
            }
            provider.validate()?;
        }

        Ok(())
    }

    /// Load configuration from file path
    ///
    /// The file may hold the configuration at its root or under a `pubsub`
    /// section.
    ///
    /// # Errors
    /// - `ConfigurationError::FileNotFound` - Configuration file missing
    /// - `ConfigurationError::Parsing` - Invalid YAML/JSON syntax or structure
    /// - Any error from [`validate`](Self::validate)
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        if !path.exists() {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Parsing {
            message: format!("Failed to read file: {}", e),
        })?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&contents),
            "json" => Self::from_json_str(&contents),
            _ => Self::from_json_str(&contents).or_else(|_| Self::from_yaml_str(&contents)),
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigurationError> {
        let document: serde_json::Value =
            serde_yaml::from_str(contents).map_err(|e| ConfigurationError::Parsing {
                message: format!("Invalid YAML: {}", e),
            })?;
        Self::from_document(document)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigurationError> {
        let document: serde_json::Value =
            serde_json::from_str(contents).map_err(|e| ConfigurationError::Parsing {
                message: format!("Invalid JSON: {}", e),
            })?;
        Self::from_document(document)
    }

    /// Read the `pubsub` section of layered configuration
    pub fn from_config(config: &config::Config) -> Result<Self, ConfigurationError> {
        let mut configuration: Self = config.get(CONFIG_SECTION).map_err(|e| match e {
            config::ConfigError::NotFound(_) => ConfigurationError::MissingProviders {
                section: CONFIG_SECTION.to_string(),
            },
            other => ConfigurationError::Parsing {
                message: other.to_string(),
            },
        })?;

        configuration.assign_keys();
        configuration.validate()?;
        Ok(configuration)
    }

    /// Environment source mapping `PUBSUB__*` variables onto the `pubsub` section
    pub fn environment_source() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .keep_prefix(true)
    }

    fn from_document(document: serde_json::Value) -> Result<Self, ConfigurationError> {
        let section = match document
            .get(CONFIG_SECTION)
            .or_else(|| document.get("PubSub"))
        {
            Some(section) => section.clone(),
            None => document,
        };

        let mut configuration: Self =
            serde_json::from_value(section).map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        configuration.assign_keys();
        configuration.validate()?;
        Ok(configuration)
    }
}
