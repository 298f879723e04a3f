//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for the mirror.

mod error;
mod types;
mod yaml;

pub use error::ConfigError;
pub use types::{GlobalConfig, IntervalConfig, SourceConfig, StoreConfig};
pub use yaml::YamlLoader;
