//! Engine-wide tunables loaded from `flipbook.json`.
//!
//! Every field has a default, so a missing or partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::paths::{self, PathConfig};

/// Settings file name looked up via [`paths::config_file`].
pub const SETTINGS_FILE: &str = "flipbook.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Entries kept by the in-memory response cache.
    pub cache_entries: usize,
    /// Largest response body accepted from the network (bytes).
    pub max_body_bytes: u64,
    /// Whole-request timeout (seconds).
    pub download_timeout_secs: u64,
    /// TCP/TLS connect timeout (seconds).
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// Flat delay between decode retries (milliseconds).
    pub retry_delay_ms: u64,
    /// Decode retries when a view does not override `decodeRetries`.
    pub default_decode_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_entries: 64,
            max_body_bytes: 50 * 1024 * 1024,
            download_timeout_secs: 30,
            connect_timeout_secs: 8,
            user_agent: concat!("flipbook/", env!("CARGO_PKG_VERSION")).to_string(),
            retry_delay_ms: 250,
            default_decode_retries: 5,
        }
    }
}

impl EngineSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Parse a settings file. Errors carry the file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        Ok(settings)
    }

    /// Load from the configured location, falling back to defaults when the
    /// file is absent. A present but broken file is still an error.
    pub fn load(config: &PathConfig) -> Result<Self> {
        let path = paths::config_file(SETTINGS_FILE, config);
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let settings = Self::from_file(&path)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{ "cache_entries": 8, "retry_delay_ms": 10 }"#).unwrap();

        let settings = EngineSettings::from_file(&path).unwrap();
        assert_eq!(settings.cache_entries, 8);
        assert_eq!(settings.retry_delay(), Duration::from_millis(10));
        assert_eq!(settings.default_decode_retries, 5);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = PathConfig {
            config_dir: Some(dir.path().to_path_buf()),
        };
        assert_eq!(EngineSettings::load(&config).unwrap(), EngineSettings::default());
    }

    #[test]
    fn test_broken_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ nope").unwrap();
        let config = PathConfig {
            config_dir: Some(dir.path().to_path_buf()),
        };
        let err = EngineSettings::load(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse settings"));
    }
}
