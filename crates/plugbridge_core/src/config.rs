// SPDX-License-Identifier: MIT OR Apache-2.0
//! Binding configuration, stored as RON.

use crate::engine::LockMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default settings file name
pub const CONFIG_FILE: &str = "plugbridge.ron";

/// Environment variable overriding [`Config::default_lock_mode`]
pub const LOCK_MODE_ENV: &str = "PLUGBRIDGE_LOCK_MODE";

/// Configuration load/save failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File contents are not valid settings
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be serialized
    #[error("Serialize error: {0}")]
    Serialize(#[from] ron::Error),
}

/// Settings shared by every binding of a registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lock mode for graphs without `lockType` metadata
    pub default_lock_mode: LockMode,
    /// Enqueue dirty requests for connected and output attributes on invalidate
    pub dirty_propagation: bool,
    /// Host name handed to the engine in the evaluation context
    pub eval_context_host: String,
    /// Reload bindings when their reference file changes on disk
    pub watch_reference_files: bool,
    /// Debounce window for reference file events
    pub watch_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_lock_mode: LockMode::Shared,
            dirty_propagation: true,
            eval_context_host: "plugbridge".to_string(),
            watch_reference_files: false,
            watch_debounce_ms: 250,
        }
    }
}

impl Config {
    /// Load settings from a RON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = ron::from_str(&content)?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load settings, falling back to defaults when the file is missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring invalid config {:?}: {e}", path);
                Self::default()
            }
        }
    }

    /// Save settings to a RON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let pretty = ron::ser::PrettyConfig::default()
            .depth_limit(4)
            .struct_names(true);
        let content = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(LOCK_MODE_ENV) {
            match LockMode::parse(&value) {
                Some(mode) => self.default_lock_mode = mode,
                None => tracing::warn!("Ignoring {LOCK_MODE_ENV}={value}: expected shared or exclusive"),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ron_round_trip() {
        let config = Config {
            default_lock_mode: LockMode::Exclusive,
            watch_debounce_ms: 50,
            ..Config::default()
        };
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        let loaded: Config = ron::from_str(&text).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let loaded: Config = ron::from_str("(dirty_propagation: false)").unwrap();
        assert!(!loaded.dirty_propagation);
        assert_eq!(loaded.watch_debounce_ms, 250);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("plugbridge-config-{}.ron", std::process::id()));
        let config = Config::default();
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
        std::fs::remove_file(&path).ok();
        assert_eq!(Config::load_or_default(&path), config);
    }
}
