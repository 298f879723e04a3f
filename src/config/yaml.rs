//! YAML configuration parsing.
//!
//! Parses the global configuration from YAML files and validates it.

use std::path::Path;

use super::error::ConfigError;
use super::types::{GlobalConfig, SourceConfig, StoreConfig};
use crate::core::types::EntityKind;

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load global configuration from a file.
    pub fn load_global_config(path: impl AsRef<Path>) -> Result<GlobalConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_global_config(&content)
    }

    /// Parse global configuration from a YAML string.
    pub fn parse_global_config(yaml: &str) -> Result<GlobalConfig, ConfigError> {
        // An empty file is a valid, all-defaults configuration.
        let config: GlobalConfig = if yaml.trim().is_empty() {
            GlobalConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a global configuration.
    pub fn validate(config: &GlobalConfig) -> Result<(), ConfigError> {
        if config.keyspace.is_empty() {
            return Err(ConfigError::MissingField("keyspace".into()));
        }
        if !config
            .keyspace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidConfig(format!(
                "keyspace '{}' may only contain letters, digits, '_' and '-'",
                config.keyspace
            )));
        }

        for kind in EntityKind::ALL {
            if config.intervals.for_kind(kind).is_zero() {
                return Err(ConfigError::InvalidConfig(format!(
                    "{} interval must be at least one second",
                    kind
                )));
            }
        }

        if let StoreConfig::Sqlite { path } = &config.store {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::MissingField("store.path".into()));
            }
        }

        match &config.source {
            SourceConfig::Scontrol { timeout_secs, .. } if *timeout_secs == 0 => {
                return Err(ConfigError::InvalidConfig(
                    "source.timeout_secs must be greater than 0".into(),
                ));
            }
            SourceConfig::Snapshot { path } if path.as_os_str().is_empty() => {
                return Err(ConfigError::MissingField("source.path".into()));
            }
            _ => {}
        }

        Ok(())
    }
}
